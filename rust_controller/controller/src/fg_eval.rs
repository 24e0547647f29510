use config::{MpcConfig, Reference, Weights};
use control_model::{KinematicBicycle, ReferencePolynomial, NS};
use nlp::{DualNum, Functional};

use crate::layout::{Layout, STATES};
use prelude::*;

/// Cost and dynamics constraints of the tracking problem for one reference polynomial.
///
/// Constraint slot `(s, 0)` holds the initial value of state `s` so it can be pinned with
/// equal bounds. Slots `(s, t)` for `t >= 1` hold the residual between the decision
/// variable and the model prediction from step `t - 1`.
#[derive(Clone, Debug)]
pub struct FgEval {
    layout: Layout,
    dt: float,
    model: KinematicBicycle,
    target: Reference,
    weights: Weights,
    reference: ReferencePolynomial,
}

impl FgEval {
    pub(crate) fn new(config: &MpcConfig, reference: ReferencePolynomial) -> FgEval {
        FgEval {
            layout: Layout::new(config.horizon.N),
            dt: config.horizon.dt,
            model: KinematicBicycle::new(config.model.Lf),
            target: config.reference.clone(),
            weights: config.weights.clone(),
            reference,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

fn sq<D: DualNum<float> + Copy>(x: D) -> D {
    x * x
}

impl Functional for FgEval {
    fn n_vars(&self) -> usize {
        self.layout.n_vars()
    }

    fn n_constraints(&self) -> usize {
        self.layout.n_constraints()
    }

    fn cost<D: DualNum<float> + Copy>(&self, vars: &[D]) -> D {
        let N = self.layout.horizon();
        let w = &self.weights;
        let r = &self.target;
        let mut cost = D::from(0.0);

        // Tracking
        for t in 0..N {
            let s = self.layout.state(vars, t);
            cost += sq(s.cte - r.cte) * w.cte;
            cost += sq(s.epsi - r.epsi) * w.epsi;
            cost += sq(s.v - r.v) * w.v;
        }

        // Actuator magnitude
        for t in 0..N - 1 {
            let u = self.layout.actuators(vars, t);
            cost += sq(u.delta) * w.delta;
            cost += sq(u.a) * w.a;
        }

        // Actuator rate of change
        for t in 0..N - 2 {
            let u0 = self.layout.actuators(vars, t);
            let u1 = self.layout.actuators(vars, t + 1);
            cost += sq(u1.delta - u0.delta) * w.delta_rate;
            cost += sq(u1.a - u0.a) * w.a_rate;
        }

        cost
    }

    fn constraints<D: DualNum<float> + Copy>(&self, vars: &[D], g: &mut [D]) {
        let layout = &self.layout;

        for &var in &STATES {
            let i = layout.index(var, 0);
            g[i] = vars[i];
        }

        for t in 1..layout.horizon() {
            let s0 = layout.state(vars, t - 1);
            let u0 = layout.actuators(vars, t - 1);
            let s1 = layout.state(vars, t).to_array();
            let predicted = self
                .model
                .predict(self.dt, &s0, &u0, &self.reference)
                .to_array();

            for k in 0..NS {
                g[layout.index(STATES[k], t)] = s1[k] - predicted[k];
            }
        }
    }
}
