use log::Level;
use osqp_wrapper::{Problem, QpError, QpStatus, Settings};
use std::time::{Duration, Instant};

use crate::{
    constraint_jacobian, cost_gradient, cost_hessian, Bounds, Functional, NlpError, Options,
    Solution, Status, INFINITE_BOUND,
};
use prelude::*;

// OSQP treats anything beyond this as infinite.
const QP_INFINITY: float = 1.0e30;
const ARMIJO: float = 1e-4;
const MIN_STEP: float = 1.0 / 1024.0;
// A fixed interval keeps OSQP independent of timing so repeated solves agree.
const ADAPTIVE_RHO_INTERVAL: u32 = 25;

/// Solves the problem from the initial guess `x0` with a line search SQP method.
///
/// Each iteration linearises the constraints, takes the cost Hessian as the quadratic model
/// and solves the resulting QP for a step, which is then shortened until an l1 merit
/// function decreases sufficiently.
pub fn solve<F: Functional>(
    f: &F,
    x0: &[float],
    x_bounds: &Bounds,
    g_bounds: &Bounds,
    options: &Options,
) -> Result<Solution, NlpError> {
    let _guard = flame::start_guard("nlp solve");
    let start = Instant::now();

    let n = f.n_vars();
    let m = f.n_constraints();
    if x0.len() != n {
        return Err(NlpError::Dimension {
            what: "initial guess",
            expected: n,
            got: x0.len(),
        });
    }
    x_bounds.validate("variable bounds", n)?;
    g_bounds.validate("constraint bounds", m)?;
    if !(options.max_cpu_time > 0.0) || !options.max_cpu_time.is_finite() {
        return Err(NlpError::Options("max_cpu_time must be finite and positive"));
    }
    if options.max_iter == 0 {
        return Err(NlpError::Options("max_iter must be at least 1"));
    }

    let time_limit = Duration::try_from_secs_f64(options.max_cpu_time)
        .map_err(|_| NlpError::Options("max_cpu_time is out of range"))?;
    let level = if options.print_level >= 1 {
        Level::Info
    } else {
        Level::Debug
    };
    let settings = Settings::default()
        .verbose(options.print_level >= 2)
        .polish(true)
        .eps_abs(options.qp_eps)
        .eps_rel(options.qp_eps)
        .max_iter(options.qp_max_iter)
        .adaptive_rho_interval(Some(ADAPTIVE_RHO_INTERVAL));

    let mut x = x0.to_vec();
    x_bounds.project(&mut x);

    // Constraint rows followed by one identity row per variable
    let mut A = Matrix::zeros(m + n, n);
    A.view_mut((m, 0), (n, n)).fill_with_identity();
    let mut l = vec![0.0; m + n];
    let mut u = vec![0.0; m + n];

    let mut constant_H = None;
    let mut merit_penalty = 0.0;
    let mut last_step = INFINITY;
    let mut iterations = 0;
    let mut status = Status::MaximumIterationsExceeded;

    while iterations < options.max_iter {
        let remaining = match time_limit.checked_sub(start.elapsed()) {
            Some(remaining) if remaining > Duration::from_secs(0) => remaining,
            _ => {
                status = Status::MaximumCpuTimeExceeded;
                break;
            }
        };
        iterations += 1;

        let (cost, grad) = cost_gradient(f, &x);
        let (g, J) = constraint_jacobian(f, &x);
        // Feasible with a vanishing gradient is a KKT point with zero multipliers
        if g_bounds.violation_inf(g.as_slice()) <= options.constr_viol_tol
            && grad.amax() <= options.tol
        {
            log!(level, "iter {:3} cost {:.6e} stationary", iterations, cost);
            last_step = 0.0;
            status = Status::Success;
            break;
        }

        let H = if options.constant_hessian {
            constant_H.get_or_insert_with(|| cost_hessian(f, &x)).clone()
        } else {
            cost_hessian(f, &x)
        };

        // Step bounds: g_l - g <= J p <= g_u - g and x_l - x <= p <= x_u - x
        A.rows_mut(0, m).copy_from(&J);
        for i in 0..m {
            l[i] = step_bound(g_bounds.lower[i], g[i]);
            u[i] = step_bound(g_bounds.upper[i], g[i]);
        }
        for i in 0..n {
            l[m + i] = step_bound(x_bounds.lower[i], x[i]);
            u[m + i] = step_bound(x_bounds.upper[i], x[i]);
        }

        let qp_settings = settings.clone().time_limit(Some(remaining));
        let mut qp = Problem::new(&H, grad.as_slice(), &A, &l, &u, &qp_settings)?;
        let qp_solution = match qp.solve() {
            Ok(solution) => solution,
            Err(QpError::PrimalInfeasible) => {
                warn!("qp subproblem infeasible at iteration {}", iterations);
                status = Status::LocalInfeasibility;
                break;
            }
            Err(e) => {
                warn!("qp subproblem failed at iteration {}: {}", iterations, e);
                status = Status::QpFailure;
                break;
            }
        };
        // An unconverged subproblem gives no usable step
        match qp_solution.status {
            QpStatus::Solved => (),
            QpStatus::SolvedInaccurate => {
                debug!("qp subproblem solved inaccurately at iteration {}", iterations)
            }
            QpStatus::MaxIterationsReached => {
                warn!(
                    "qp subproblem hit {} iterations at iteration {}",
                    options.qp_max_iter, iterations
                );
                status = Status::QpFailure;
                break;
            }
            QpStatus::TimeLimitReached => {
                status = Status::MaximumCpuTimeExceeded;
                break;
            }
        }

        let p = Vector::from_vec(qp_solution.x);
        let multipliers_inf = norm_inf(&qp_solution.y[..m]);
        merit_penalty = max(merit_penalty, 1.1 * multipliers_inf);

        // Backtrack on the l1 merit function
        let violation = g_bounds.violation_l1(g.as_slice());
        let merit = cost + merit_penalty * violation;
        let slope = min(grad.dot(&p) - merit_penalty * violation, 0.0);
        let mut alpha = 1.0;
        let mut x_trial = vec![0.0; n];
        loop {
            for i in 0..n {
                x_trial[i] = x[i] + alpha * p[i];
            }
            x_bounds.project(&mut x_trial);
            let trial_merit = merit_value(f, &x_trial, g_bounds, merit_penalty);
            if trial_merit <= merit + ARMIJO * alpha * slope || alpha <= MIN_STEP {
                break;
            }
            alpha *= 0.5;
        }
        if alpha < 1.0 {
            debug!("step shortened to {}", alpha);
        }

        x.copy_from_slice(&x_trial);
        last_step = p.amax();
        let violation = constraint_violation(f, &x, g_bounds);

        log!(
            level,
            "iter {:3} cost {:.6e} violation {:.3e} |p| {:.3e} alpha {:.4} penalty {:.3e}",
            iterations,
            cost,
            violation,
            last_step,
            alpha,
            merit_penalty
        );

        if violation <= options.constr_viol_tol && last_step <= options.tol * (1.0 + norm_inf(&x))
        {
            status = Status::Success;
            break;
        }
    }

    let constraint_violation = constraint_violation(f, &x, g_bounds);
    if status == Status::MaximumIterationsExceeded
        && constraint_violation <= options.acceptable_tol
        && last_step <= options.acceptable_tol * (1.0 + norm_inf(&x))
    {
        status = Status::SolvedToAcceptableLevel;
    }

    let solution = Solution {
        status,
        obj_value: f.cost(&x),
        x,
        iterations,
        constraint_violation,
        elapsed: start.elapsed(),
    };

    log!(
        level,
        "{:?} after {} iterations, cost {:.6e}, violation {:.3e}, {:.1} ms",
        solution.status,
        solution.iterations,
        solution.obj_value,
        solution.constraint_violation,
        duration_to_secs(solution.elapsed) * 1e3
    );

    Ok(solution)
}

fn step_bound(bound: float, value: float) -> float {
    if bound >= INFINITE_BOUND {
        QP_INFINITY
    } else if bound <= -INFINITE_BOUND {
        -QP_INFINITY
    } else {
        bound - value
    }
}

fn constraint_violation<F: Functional>(f: &F, x: &[float], g_bounds: &Bounds) -> float {
    let mut g = vec![0.0; f.n_constraints()];
    f.constraints(x, &mut g);
    g_bounds.violation_inf(&g)
}

fn merit_value<F: Functional>(f: &F, x: &[float], g_bounds: &Bounds, penalty: float) -> float {
    let mut g = vec![0.0; f.n_constraints()];
    f.constraints(x, &mut g);
    f.cost(x) + penalty * g_bounds.violation_l1(&g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::DualNum;

    fn options() -> Options {
        Options {
            max_cpu_time: 10.0,
            max_iter: 100,
            ..Options::default()
        }
    }

    // min (x0 - 2)^2 + (x1 - 8)^2  subject to  x1 = x0^3
    struct Cubic;

    impl Functional for Cubic {
        fn n_vars(&self) -> usize {
            2
        }

        fn n_constraints(&self) -> usize {
            1
        }

        fn cost<D: DualNum<float> + Copy>(&self, x: &[D]) -> D {
            let a = x[0] - 2.0;
            let b = x[1] - 8.0;
            a * a + b * b
        }

        fn constraints<D: DualNum<float> + Copy>(&self, x: &[D], g: &mut [D]) {
            g[0] = x[1] - x[0] * x[0] * x[0];
        }
    }

    #[test]
    fn reaches_minimum_on_curve() {
        let solution = solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &options(),
        ).unwrap();

        assert_eq!(solution.status, Status::Success);
        assert_relative_eq!(solution.x[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(solution.x[1], 8.0, epsilon = 1e-4);
        assert!(solution.constraint_violation <= 1e-6);
    }

    // min (x0 - 3)^2 + (x1 - 3)^2  subject to  x0 + x1 = 2,  x0 <= 0.5
    struct Linear;

    impl Functional for Linear {
        fn n_vars(&self) -> usize {
            2
        }

        fn n_constraints(&self) -> usize {
            1
        }

        fn cost<D: DualNum<float> + Copy>(&self, x: &[D]) -> D {
            let a = x[0] - 3.0;
            let b = x[1] - 3.0;
            a * a + b * b
        }

        fn constraints<D: DualNum<float> + Copy>(&self, x: &[D], g: &mut [D]) {
            g[0] = x[0] + x[1];
        }
    }

    #[test]
    fn respects_active_variable_bound() {
        let mut x_bounds = Bounds::unbounded(2);
        x_bounds.set(0, -INFINITE_BOUND, 0.5);

        let solution = solve(
            &Linear,
            &[0.0, 0.0],
            &x_bounds,
            &Bounds::fixed(&[2.0]),
            &options(),
        ).unwrap();

        assert!(solution.status.is_success());
        assert_relative_eq!(solution.x[0], 0.5, epsilon = 1e-5);
        assert_relative_eq!(solution.x[1], 1.5, epsilon = 1e-5);
        assert_relative_eq!(solution.obj_value, 2.5 * 2.5 + 1.5 * 1.5, epsilon = 1e-4);
    }

    #[test]
    fn constant_hessian_matches_exact_for_quadratic_cost() {
        let exact = solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &options(),
        ).unwrap();
        let constant = solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &Options {
                constant_hessian: true,
                ..options()
            },
        ).unwrap();

        assert_relative_eq!(exact.x[0], constant.x[0], epsilon = 1e-6);
        assert_relative_eq!(exact.x[1], constant.x[1], epsilon = 1e-6);
    }

    #[test]
    fn infeasible_constraints_are_reported() {
        // x0 + x1 = 2 cannot hold with both variables in [0, 0.5]
        let mut x_bounds = Bounds::unbounded(2);
        x_bounds.set(0, 0.0, 0.5);
        x_bounds.set(1, 0.0, 0.5);

        let solution = solve(
            &Linear,
            &[0.0, 0.0],
            &x_bounds,
            &Bounds::fixed(&[2.0]),
            &options(),
        ).unwrap();

        assert_eq!(solution.status, Status::LocalInfeasibility);
        assert!(!solution.status.is_success());
        assert_eq!(solution.x.len(), 2);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let solution = solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &Options {
                max_iter: 1,
                acceptable_tol: 1e-12,
                ..options()
            },
        ).unwrap();

        assert_eq!(solution.status, Status::MaximumIterationsExceeded);
        assert_eq!(solution.iterations, 1);
    }

    #[test]
    fn unconverged_subproblem_stops_the_solve() {
        let solution = solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &Options {
                qp_eps: 1e-14,
                qp_max_iter: 1,
                ..options()
            },
        ).unwrap();

        assert_eq!(solution.status, Status::QpFailure);
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.x, vec![1.0, 1.0]);
    }

    #[test]
    fn oversized_time_limit_is_an_error() {
        let options = Options {
            max_cpu_time: 1e300,
            ..options()
        };
        match solve(&Cubic, &[1.0, 1.0], &Bounds::unbounded(2), &Bounds::fixed(&[0.0]), &options) {
            Err(NlpError::Options(_)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        match solve(
            &Cubic,
            &[1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0]),
            &options(),
        ) {
            Err(NlpError::Dimension { expected: 2, got: 1, .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }

        match solve(
            &Cubic,
            &[1.0, 1.0],
            &Bounds::unbounded(2),
            &Bounds::fixed(&[0.0, 0.0]),
            &options(),
        ) {
            Err(NlpError::Dimension { expected: 1, got: 2, .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
