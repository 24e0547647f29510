use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::Error;
use prelude::*;

pub static CONFIG_FILE: &'static str = "simulator.toml";

/// What to apply when the controller fails to converge.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Zero steering and zero throttle.
    Zero,
    /// The first actuation of the solver's final iterate.
    BestEffort,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Simulated time in seconds.
    pub t: float,
    /// Control period in seconds.
    pub dt: float,
    /// Plant acceleration per unit of normalised throttle.
    pub accel_gain: float,
    pub initial_speed: float,
    /// Number of track waypoints fitted by the reference cubic.
    pub n_fit: usize,
    pub on_failure: FailurePolicy,
    pub flame_graph: bool,
    pub mpc_config: String,
    pub track: TrackConfig,
}

/// Elliptic track centred on the origin, driven anticlockwise.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrackConfig {
    pub radius_x: float,
    pub radius_y: float,
    pub n_waypoints: usize,
}

impl Default for SimulatorConfig {
    fn default() -> SimulatorConfig {
        SimulatorConfig {
            t: 30.0,
            dt: 0.1,
            accel_gain: 5.0,
            initial_speed: 0.0,
            n_fit: 6,
            on_failure: FailurePolicy::Zero,
            flame_graph: false,
            mpc_config: config::CONFIG_FILE.to_owned(),
            track: TrackConfig::default(),
        }
    }
}

impl Default for TrackConfig {
    fn default() -> TrackConfig {
        TrackConfig {
            radius_x: 120.0,
            radius_y: 70.0,
            n_waypoints: 60,
        }
    }
}

impl SimulatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SimulatorConfig, Error> {
        let path = path.as_ref();
        let mut config_str = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut config_str))
            .map_err(|source| Error::Io {
                path: path.to_owned(),
                source,
            })?;
        SimulatorConfig::parse(&config_str)
    }

    pub fn parse(s: &str) -> Result<SimulatorConfig, Error> {
        let config: SimulatorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("t", self.t),
            ("dt", self.dt),
            ("accel_gain", self.accel_gain),
            ("track.radius_x", self.track.radius_x),
            ("track.radius_y", self.track.radius_y),
        ];
        for &(name, value) in &positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !(self.initial_speed.is_finite() && self.initial_speed >= 0.0) {
            return Err(Error::Invalid(format!(
                "initial_speed must be non-negative, got {}",
                self.initial_speed
            )));
        }
        if self.n_fit < 4 {
            return Err(Error::Invalid(format!(
                "a cubic needs at least 4 waypoints, n_fit is {}",
                self.n_fit
            )));
        }
        if self.track.n_waypoints < self.n_fit {
            return Err(Error::Invalid(format!(
                "track has {} waypoints, fewer than n_fit {}",
                self.track.n_waypoints, self.n_fit
            )));
        }
        Ok(())
    }
}
