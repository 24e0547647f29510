#![allow(non_snake_case)]

extern crate nalgebra;
extern crate num_dual;
extern crate prelude;
extern crate thiserror;

use prelude::*;
use thiserror::Error;

mod kinematic_bicycle;
pub use kinematic_bicycle::{KinematicBicycle, Pose};

mod polynomial;
pub use polynomial::{ReferencePolynomial, COEFFICIENT_COUNT};

pub use num_dual::DualNum;

/// Number of scalars in a `VehicleState`.
pub const NS: usize = 6;
/// Number of scalars in `Actuators`.
pub const NI: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("reference polynomial needs {expected} coefficients, got {got}")]
    CoefficientCount { expected: usize, got: usize },
    #[error("reference coefficient {index} is not finite: {value}")]
    NonFiniteCoefficient { index: usize, value: float },
}

/// Vehicle state in the local frame, with the tracking errors relative to the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VehicleState<T = float> {
    pub x: T,
    pub y: T,
    pub psi: T,
    pub v: T,
    pub cte: T,
    pub epsi: T,
}

impl<T: Copy> VehicleState<T> {
    pub fn from_array(a: [T; NS]) -> VehicleState<T> {
        let [x, y, psi, v, cte, epsi] = a;
        VehicleState {
            x,
            y,
            psi,
            v,
            cte,
            epsi,
        }
    }

    pub fn to_array(&self) -> [T; NS] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }
}

impl VehicleState {
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Steering angle `delta` and normalised acceleration `a`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Actuators<T = float> {
    pub delta: T,
    pub a: T,
}
