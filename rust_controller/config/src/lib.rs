#![allow(non_snake_case)]

extern crate prelude;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate thiserror;
extern crate toml;

use prelude::*;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub static CONFIG_FILE: &'static str = "mpc.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to deserialise config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("horizon must contain at least 2 steps, got {0}")]
    HorizonTooShort(usize),
    #[error("{name} must be finite and positive, got {value}")]
    NotPositive { name: &'static str, value: float },
    #[error("{name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: float },
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: float },
    #[error("{name} bounds are empty: [{lower}, {upper}]")]
    EmptyBounds {
        name: &'static str,
        lower: float,
        upper: float,
    },
}

/// Everything the optimizer needs that stays fixed for the lifetime of the process.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MpcConfig {
    pub horizon: Horizon,
    pub model: Model,
    pub reference: Reference,
    pub weights: Weights,
    pub bounds: Bounds,
    pub solver: Solver,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Horizon {
    /// Number of timesteps, including the current one.
    pub N: usize,
    /// Duration of one timestep in seconds.
    pub dt: float,
}

impl Default for Horizon {
    fn default() -> Horizon {
        Horizon { N: 10, dt: 0.1 }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Model {
    /// Distance from the centre of mass to the front axle.
    pub Lf: float,
}

impl Default for Model {
    fn default() -> Model {
        Model { Lf: 2.67 }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Reference {
    pub cte: float,
    pub epsi: float,
    /// Target cruise speed.
    pub v: float,
}

impl Default for Reference {
    fn default() -> Reference {
        Reference {
            cte: 0.0,
            epsi: 0.0,
            v: 40.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Weights {
    pub cte: float,
    pub epsi: float,
    pub v: float,
    pub delta: float,
    pub a: float,
    pub delta_rate: float,
    pub a_rate: float,
}

impl Default for Weights {
    fn default() -> Weights {
        Weights {
            cte: 3000.0,
            epsi: 3000.0,
            v: 1.0,
            delta: 5.0,
            a: 5.0,
            delta_rate: 180.0,
            a_rate: 5.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Bounds {
    /// Magnitude used for the otherwise unbounded state variables.
    pub state: float,
    /// Maximum steering angle in radians (25 degrees).
    pub delta: float,
    pub a_min: float,
    pub a_max: float,
}

impl Default for Bounds {
    fn default() -> Bounds {
        Bounds {
            state: 1.0e19,
            delta: 0.436332,
            a_min: -1.0,
            a_max: 1.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Solver {
    /// 0 is silent.
    pub print_level: u8,
    /// Wall clock cap for one solve in seconds.
    pub max_cpu_time: float,
    pub max_iter: u32,
    pub tol: float,
    pub constr_viol_tol: float,
    pub acceptable_tol: float,
    /// Evaluate the cost Hessian once per solve. Exact for quadratic costs.
    pub constant_hessian: bool,
    pub qp_eps: float,
    pub qp_max_iter: u32,
}

impl Default for Solver {
    fn default() -> Solver {
        Solver {
            print_level: 0,
            max_cpu_time: 0.5,
            max_iter: 50,
            tol: 1e-6,
            constr_viol_tol: 1e-6,
            acceptable_tol: 1e-3,
            constant_hessian: true,
            qp_eps: 1e-5,
            qp_max_iter: 10_000,
        }
    }
}

impl MpcConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MpcConfig, ConfigError> {
        let path = path.as_ref();
        let mut config_str = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut config_str))
            .map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?;
        config_str.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon.N < 2 {
            return Err(ConfigError::HorizonTooShort(self.horizon.N));
        }
        positive("horizon.dt", self.horizon.dt)?;
        positive("model.Lf", self.model.Lf)?;

        finite("reference.cte", self.reference.cte)?;
        finite("reference.epsi", self.reference.epsi)?;
        finite("reference.v", self.reference.v)?;

        let w = &self.weights;
        non_negative("weights.cte", w.cte)?;
        non_negative("weights.epsi", w.epsi)?;
        non_negative("weights.v", w.v)?;
        non_negative("weights.delta", w.delta)?;
        non_negative("weights.a", w.a)?;
        non_negative("weights.delta_rate", w.delta_rate)?;
        non_negative("weights.a_rate", w.a_rate)?;

        let b = &self.bounds;
        positive("bounds.state", b.state)?;
        positive("bounds.delta", b.delta)?;
        finite("bounds.a_min", b.a_min)?;
        finite("bounds.a_max", b.a_max)?;
        if b.a_min > b.a_max {
            return Err(ConfigError::EmptyBounds {
                name: "bounds.a",
                lower: b.a_min,
                upper: b.a_max,
            });
        }

        let s = &self.solver;
        positive("solver.max_cpu_time", s.max_cpu_time)?;
        positive("solver.max_iter", float::from(s.max_iter))?;
        positive("solver.tol", s.tol)?;
        positive("solver.constr_viol_tol", s.constr_viol_tol)?;
        positive("solver.acceptable_tol", s.acceptable_tol)?;
        positive("solver.qp_eps", s.qp_eps)?;
        positive("solver.qp_max_iter", float::from(s.qp_max_iter))?;

        Ok(())
    }
}

impl FromStr for MpcConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<MpcConfig, ConfigError> {
        let config: MpcConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

fn finite(name: &'static str, value: float) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name, value })
    }
}

fn positive(name: &'static str, value: float) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: float) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}
