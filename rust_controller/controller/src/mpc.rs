use config::{MpcConfig, Solver};
use control_model::{ReferencePolynomial, VehicleState};
use nlp::{Options, Status};
use std::time::Duration;

use crate::fg_eval::FgEval;
use crate::layout::{Layout, Var, STATES};
use crate::{Actuation, MpcError};
use prelude::*;

/// Raw outcome of one solve, kept for diagnostics.
#[derive(Clone, Debug)]
pub struct SolveResult {
    pub status: Status,
    pub cost: float,
    /// The final decision vector, see `Layout`.
    pub vars: Vec<float>,
    pub iterations: u32,
    pub elapsed: Duration,
}

/// Receding horizon tracking controller. Holds no state between solves.
pub struct Mpc {
    config: MpcConfig,
    layout: Layout,
    options: Options,
    x_bounds: nlp::Bounds,
}

impl Mpc {
    pub fn new(config: MpcConfig) -> Result<Mpc, MpcError> {
        config.validate()?;

        let layout = Layout::new(config.horizon.N);
        let options = solver_options(&config.solver);

        let b = &config.bounds;
        let mut x_bounds = nlp::Bounds::unbounded(layout.n_vars());
        for &var in &STATES {
            let start = layout.start(var);
            x_bounds.fill(start..start + layout.len(var), -b.state, b.state);
        }
        let start = layout.start(Var::Delta);
        x_bounds.fill(start..start + layout.len(Var::Delta), -b.delta, b.delta);
        let start = layout.start(Var::A);
        x_bounds.fill(start..start + layout.len(Var::A), b.a_min, b.a_max);

        Ok(Mpc {
            config,
            layout,
            options,
            x_bounds,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The cost and constraints used when tracking `reference`.
    pub fn functional(&self, reference: ReferencePolynomial) -> FgEval {
        FgEval::new(&self.config, reference)
    }

    /// Computes the first actuation and the predicted path from `state` along the cubic with
    /// coefficients `coeffs` (ascending powers, vehicle frame).
    ///
    /// A solve that does not converge is returned as `MpcError::NotConverged` carrying the
    /// actuation read from the final iterate.
    pub fn solve(&self, state: &VehicleState, coeffs: &[float]) -> Result<Actuation, MpcError> {
        let result = self.solve_raw(state, coeffs)?;
        let actuation = self.actuation(&result.vars, result.cost);

        if result.status.is_success() {
            Ok(actuation)
        } else {
            Err(MpcError::NotConverged {
                status: result.status,
                cost: result.cost,
                best_effort: actuation,
            })
        }
    }

    pub fn solve_raw(
        &self,
        state: &VehicleState,
        coeffs: &[float],
    ) -> Result<SolveResult, MpcError> {
        let _guard = flame::start_guard("mpc solve");

        let reference = ReferencePolynomial::new(coeffs)?;
        if !state.is_finite() {
            return Err(MpcError::InvalidState(*state));
        }

        let fg = self.functional(reference);
        let layout = self.layout;

        let mut x0 = vec![0.0; layout.n_vars()];
        layout.set_state(&mut x0, 0, state);

        // Dynamics residuals vanish, the initial slots are pinned to the current state
        let mut g_bounds = nlp::Bounds::fixed(&vec![0.0; layout.n_constraints()]);
        for (&var, &value) in STATES.iter().zip(&state.to_array()) {
            let i = layout.index(var, 0);
            g_bounds.set(i, value, value);
        }

        let solution = nlp::solve(&fg, &x0, &self.x_bounds, &g_bounds, &self.options)?;

        if solution.status.is_success() {
            debug!(
                "mpc {:?}: cost {:.4}, {} iterations, {:.2} ms",
                solution.status,
                solution.obj_value,
                solution.iterations,
                duration_to_secs(solution.elapsed) * 1e3
            );
        } else {
            warn!(
                "mpc {:?}: cost {:.4}, violation {:.3e}, {} iterations, {:.2} ms",
                solution.status,
                solution.obj_value,
                solution.constraint_violation,
                solution.iterations,
                duration_to_secs(solution.elapsed) * 1e3
            );
        }

        Ok(SolveResult {
            status: solution.status,
            cost: solution.obj_value,
            vars: solution.x,
            iterations: solution.iterations,
            elapsed: solution.elapsed,
        })
    }

    /// Reads the first actuators and the predicted positions `1..N` out of a decision vector.
    pub fn actuation(&self, vars: &[float], cost: float) -> Actuation {
        let layout = self.layout;
        let first = layout.actuators(vars, 0);
        let predicted = (1..layout.horizon())
            .map(|t| (vars[layout.index(Var::X, t)], vars[layout.index(Var::Y, t)]))
            .collect();

        Actuation {
            steering: first.delta,
            acceleration: first.a,
            predicted,
            cost,
        }
    }
}

fn solver_options(s: &Solver) -> Options {
    Options {
        print_level: s.print_level,
        max_cpu_time: s.max_cpu_time,
        max_iter: s.max_iter,
        tol: s.tol,
        constr_viol_tol: s.constr_viol_tol,
        acceptable_tol: s.acceptable_tol,
        constant_hessian: s.constant_hessian,
        qp_eps: s.qp_eps,
        qp_max_iter: s.qp_max_iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use config::ConfigError;
    use control_model::ModelError;
    use nlp::INFINITE_BOUND;

    fn mpc() -> Mpc {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 10.0;
        config.solver.max_iter = 200;
        Mpc::new(config).unwrap()
    }

    #[test]
    fn bounds_follow_config() {
        let mpc = mpc();
        let layout = mpc.layout();
        let b = &mpc.x_bounds;

        let i = layout.index(Var::Cte, 4);
        assert_eq!((b.lower[i], b.upper[i]), (-1.0e19, 1.0e19));
        assert!(b.upper[i] >= INFINITE_BOUND);
        let i = layout.index(Var::Delta, 8);
        assert_eq!((b.lower[i], b.upper[i]), (-0.436332, 0.436332));
        let i = layout.index(Var::A, 0);
        assert_eq!((b.lower[i], b.upper[i]), (-1.0, 1.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = MpcConfig::default();
        config.horizon.N = 1;
        match Mpc::new(config) {
            Err(MpcError::Config(ConfigError::HorizonTooShort(1))) => (),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("horizon of 1 accepted"),
        }
    }

    #[test]
    fn wrong_coefficient_count_is_rejected() {
        let state = VehicleState::default();
        match mpc().solve(&state, &[0.0, 0.0, 0.0]) {
            Err(MpcError::InvalidReference(ModelError::CoefficientCount { got: 3, .. })) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn non_finite_state_is_rejected() {
        let state = VehicleState {
            v: NAN,
            ..Default::default()
        };
        match mpc().solve(&state, &[0.0; 4]) {
            Err(MpcError::InvalidState(_)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn actuation_reads_first_controls_and_path() {
        let mpc = mpc();
        let layout = mpc.layout();
        let mut vars = vec![0.0; layout.n_vars()];
        vars[layout.index(Var::Delta, 0)] = 0.1;
        vars[layout.index(Var::Delta, 1)] = 0.2;
        vars[layout.index(Var::A, 0)] = -0.5;
        vars[layout.index(Var::X, 0)] = 99.0;
        for t in 1..10 {
            vars[layout.index(Var::X, t)] = t as float;
            vars[layout.index(Var::Y, t)] = -(t as float);
        }

        let actuation = mpc.actuation(&vars, 12.0);
        assert_eq!(actuation.steering, 0.1);
        assert_eq!(actuation.acceleration, -0.5);
        assert_eq!(actuation.cost, 12.0);
        assert_eq!(actuation.predicted.len(), 9);
        assert_eq!(actuation.predicted[0], (1.0, -1.0));
        assert_eq!(actuation.predicted[8], (9.0, -9.0));
    }

    #[test]
    fn iteration_limit_reports_best_effort() {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 10.0;
        config.solver.max_iter = 1;
        config.solver.acceptable_tol = 1e-12;
        let mpc = Mpc::new(config).unwrap();
        let state = VehicleState {
            v: 10.0,
            cte: 1.0,
            ..Default::default()
        };

        match mpc.solve(&state, &[1.0, 0.0, 0.0, 0.0]) {
            Err(MpcError::NotConverged {
                status,
                best_effort,
                ..
            }) => {
                assert_eq!(status, Status::MaximumIterationsExceeded);
                assert_eq!(best_effort.predicted.len(), 9);
                assert!(best_effort.steering.abs() <= 0.436332 + 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn solver_options_mirror_config() {
        let options = solver_options(&Solver::default());
        assert_eq!(options.max_iter, 50);
        assert!(options.constant_hessian);
        assert_relative_eq!(options.max_cpu_time, 0.5);
    }
}
