//! Receding horizon controller tracking a cubic reference path with a kinematic bicycle.
//!
//! Each call to [`Mpc::solve`] builds a fresh nonlinear program over `N` states and `N - 1`
//! actuator pairs, pins the first state to the measured one and returns the first actuation
//! together with the predicted path.

#![allow(non_snake_case)]

extern crate config;
extern crate control_model;
extern crate flame;
#[macro_use]
extern crate log;
extern crate nlp;
extern crate prelude;
extern crate thiserror;

use config::ConfigError;
use control_model::{ModelError, VehicleState};
use nlp::NlpError;
use thiserror::Error;

use prelude::*;

mod fg_eval;
pub use fg_eval::FgEval;

mod layout;
pub use layout::{Layout, Var, ACTUATORS, STATES};

mod mpc;
pub use mpc::{Mpc, SolveResult};

pub use nlp::Status;

/// First actuation of an optimised trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct Actuation {
    /// Steering angle in radians.
    pub steering: float,
    /// Normalised acceleration.
    pub acceleration: float,
    /// Predicted `(x, y)` in the vehicle frame for every step after the current one.
    pub predicted: Vec<(float, float)>,
    pub cost: float,
}

#[derive(Debug, Error)]
pub enum MpcError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] ModelError),
    #[error("vehicle state is not finite: {0:?}")]
    InvalidState(VehicleState),
    #[error("solver failed: {0}")]
    Solver(#[from] NlpError),
    #[error("solver stopped with {status:?} at cost {cost}")]
    NotConverged {
        status: Status,
        cost: float,
        best_effort: Actuation,
    },
}
