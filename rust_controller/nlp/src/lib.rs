//! Nonlinear programming with equality/inequality constraints and variable bounds:
//!
//! ```text
//! minimise    f(x)
//! subject to  g_l <= g(x) <= g_u
//!             x_l <= x    <= x_u
//! ```
//!
//! `f` and `g` are supplied through [`Functional`] as plain arithmetic over a dual number
//! type, derivatives are taken by forward mode automatic differentiation and the problem is
//! solved by sequential quadratic programming with OSQP.

#![allow(non_snake_case)]

extern crate flame;
#[macro_use]
extern crate log;
extern crate num_dual;
extern crate osqp_wrapper;
extern crate prelude;
extern crate thiserror;

use osqp_wrapper::QpError;
use std::time::Duration;
use thiserror::Error;

use prelude::*;

mod derivatives;
pub use derivatives::{constraint_jacobian, cost_gradient, cost_hessian};

mod sqp;
pub use sqp::solve;

pub use num_dual::DualNum;

/// Bounds with a magnitude at or above this value are treated as absent.
pub const INFINITE_BOUND: float = 1.0e19;

/// Cost and constraint functions of an optimisation problem.
///
/// Both functions must be deterministic and free of side effects. They are evaluated with
/// `f64`, `Dual64` and `HyperDual64` values.
pub trait Functional {
    fn n_vars(&self) -> usize;

    fn n_constraints(&self) -> usize;

    fn cost<D: DualNum<float> + Copy>(&self, vars: &[D]) -> D;

    /// Writes every constraint value into `g`, which has length `n_constraints()`.
    fn constraints<D: DualNum<float> + Copy>(&self, vars: &[D], g: &mut [D]);
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    pub lower: Vec<float>,
    pub upper: Vec<float>,
}

impl Bounds {
    pub fn unbounded(n: usize) -> Bounds {
        Bounds {
            lower: vec![-INFINITE_BOUND; n],
            upper: vec![INFINITE_BOUND; n],
        }
    }

    pub fn fixed(values: &[float]) -> Bounds {
        Bounds {
            lower: values.to_vec(),
            upper: values.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn set(&mut self, i: usize, lower: float, upper: float) {
        self.lower[i] = lower;
        self.upper[i] = upper;
    }

    pub fn fill(&mut self, range: std::ops::Range<usize>, lower: float, upper: float) {
        for i in range {
            self.set(i, lower, upper);
        }
    }

    /// Sum of the distances of `values` outside the bounds.
    pub fn violation_l1(&self, values: &[float]) -> float {
        self.violations(values).sum()
    }

    /// Largest distance of any of `values` outside the bounds.
    pub fn violation_inf(&self, values: &[float]) -> float {
        self.violations(values).fold(0.0, max)
    }

    pub fn project(&self, values: &mut [float]) {
        for ((v, &l), &u) in values.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = min(max(*v, l), u);
        }
    }

    fn violations<'a>(&'a self, values: &'a [float]) -> impl Iterator<Item = float> + 'a {
        values
            .iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .map(|((&v, &l), &u)| max(l - v, 0.0) + max(v - u, 0.0))
    }

    fn validate(&self, what: &'static str, n: usize) -> Result<(), NlpError> {
        if self.lower.len() != n || self.upper.len() != n {
            return Err(NlpError::Dimension {
                what,
                expected: n,
                got: max(self.lower.len(), self.upper.len()),
            });
        }
        for (index, (&lower, &upper)) in self.lower.iter().zip(&self.upper).enumerate() {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(NlpError::EmptyBounds {
                    what,
                    index,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// 0 is silent, 1 logs every iteration at info level, 2 also enables OSQP output.
    pub print_level: u8,
    /// Wall clock cap in seconds.
    pub max_cpu_time: float,
    pub max_iter: u32,
    /// Step tolerance relative to the size of the iterate.
    pub tol: float,
    pub constr_viol_tol: float,
    /// Step and constraint tolerance accepted when the iteration limit is hit.
    pub acceptable_tol: float,
    /// Evaluate the cost Hessian once at the initial guess and reuse it.
    pub constant_hessian: bool,
    pub qp_eps: float,
    pub qp_max_iter: u32,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            print_level: 0,
            max_cpu_time: 0.5,
            max_iter: 50,
            tol: 1e-6,
            constr_viol_tol: 1e-6,
            acceptable_tol: 1e-3,
            constant_hessian: false,
            qp_eps: 1e-5,
            qp_max_iter: 10_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    SolvedToAcceptableLevel,
    MaximumIterationsExceeded,
    MaximumCpuTimeExceeded,
    /// The linearised constraints could not be satisfied.
    LocalInfeasibility,
    /// OSQP failed on a subproblem for a reason other than infeasibility.
    QpFailure,
}

impl Status {
    pub fn is_success(&self) -> bool {
        match *self {
            Status::Success | Status::SolvedToAcceptableLevel => true,
            _ => false,
        }
    }
}

/// Final iterate of a solve. `x` is filled even when `status` is not a success.
#[derive(Clone, Debug)]
pub struct Solution {
    pub status: Status,
    pub obj_value: float,
    pub x: Vec<float>,
    pub iterations: u32,
    pub constraint_violation: float,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum NlpError {
    #[error("{what} has length {got}, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{what} bound {index} is empty: [{lower}, {upper}]")]
    EmptyBounds {
        what: &'static str,
        index: usize,
        lower: float,
        upper: float,
    },
    #[error("solver options are invalid: {0}")]
    Options(&'static str),
    #[error(transparent)]
    Qp(#[from] QpError),
}
