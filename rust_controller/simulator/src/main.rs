// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

extern crate env_logger;
extern crate flame;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate stats;
extern crate thiserror;
extern crate toml;

extern crate config;
extern crate control_model;
extern crate controller;
extern crate prelude;

mod flame_merge;
mod reference;
mod sim_config;

use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use thiserror::Error;

use config::{ConfigError, MpcConfig};
use control_model::{Actuators, KinematicBicycle, ModelError, Pose, ReferencePolynomial, VehicleState};
use controller::{Actuation, Mpc, MpcError};
use prelude::*;
use reference::{polyfit, to_vehicle_frame, FitError, Track};
use sim_config::{FailurePolicy, SimulatorConfig};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("unable to deserialise simulator config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid simulator config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Mpc(#[from] MpcError),
    #[error("unable to write flame graph: {0}")]
    Flame(#[source] io::Error),
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let sim_config = SimulatorConfig::load(sim_config::CONFIG_FILE)?;
    let mpc_config = MpcConfig::load(&sim_config.mpc_config)?;
    let plant = KinematicBicycle::new(mpc_config.model.Lf);
    let mpc = Mpc::new(mpc_config)?;

    let track = Track::ellipse(
        sim_config.track.radius_x,
        sim_config.track.radius_y,
        sim_config.track.n_waypoints,
    );
    let (x0, y0) = track.waypoints()[0];
    let mut pose = Pose::new(x0, y0, PI / 2.0, sim_config.initial_speed);

    let n_steps = (sim_config.t / sim_config.dt) as usize;
    let mut stats = stats::OnlineStats::new();
    let mut failures = 0;

    for i in 0..n_steps {
        let _guard = flame::start_guard("control cycle");

        let waypoints = track.ahead(pose[0], pose[1], sim_config.n_fit);
        let (state, reference) = vehicle_reference(&pose, &waypoints)?;

        // Start controller timer
        let controller_start = Instant::now();
        let result = mpc.solve(&state, reference.coefficients());
        let controller_millis = duration_to_secs(controller_start.elapsed()) * 1e3;
        stats.add(controller_millis);

        if result.is_err() {
            failures += 1;
        }
        let u = apply_policy(result, sim_config.on_failure)?;

        let plant_input = Actuators {
            delta: u.delta,
            a: u.a * sim_config.accel_gain,
        };
        pose = flame::span_of("plant step", || {
            plant.step(sim_config.dt, &pose, &plant_input)
        });

        info!(
            "t {:.1} pose ({:.2}, {:.2}, {:.3}) v {:.2} cte {:.3} epsi {:.3}",
            i as float * sim_config.dt,
            pose[0],
            pose[1],
            wrap_angle(pose[2]),
            pose[3],
            state.cte,
            state.epsi
        );
        info!(
            "steering {:.4} acceleration {:.3}, controller took {:.2} ms",
            u.delta, u.a, controller_millis
        );
    }

    println!("Controller stats (mean/ms, stdev/ms): {:?}", stats);
    if failures > 0 {
        warn!("{} of {} solves did not converge", failures, n_steps);
    }

    if sim_config.flame_graph {
        flame_merge::write_flame("flame-graph.html").map_err(Error::Flame)?;
    }

    Ok(())
}

/// Fits the waypoints in the vehicle frame and derives the tracking errors at the vehicle.
fn vehicle_reference(
    pose: &Pose,
    waypoints: &[(float, float)],
) -> Result<(VehicleState, ReferencePolynomial), Error> {
    let local = to_vehicle_frame(pose, waypoints);
    let reference = ReferencePolynomial::new(&polyfit(&local, 3)?)?;

    let state = VehicleState {
        v: pose[3],
        cte: reference.eval(0.0),
        epsi: -reference.heading(0.0),
        ..Default::default()
    };
    Ok((state, reference))
}

fn apply_policy(
    result: Result<Actuation, MpcError>,
    policy: FailurePolicy,
) -> Result<Actuators, Error> {
    match result {
        Ok(actuation) => Ok(Actuators {
            delta: actuation.steering,
            a: actuation.acceleration,
        }),
        Err(MpcError::NotConverged {
            status,
            best_effort,
            ..
        }) => {
            warn!("controller stopped with {:?}, applying {:?}", status, policy);
            Ok(match policy {
                FailurePolicy::Zero => Actuators::default(),
                FailurePolicy::BestEffort => Actuators {
                    delta: best_effort.steering,
                    a: best_effort.acceleration,
                },
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use controller::Status;

    #[test]
    fn reference_parallel_to_path() {
        let pose = Pose::new(3.0, 1.0, 0.0, 12.0);
        let waypoints: Vec<_> = (0..6).map(|i| (i as float * 5.0, 2.0)).collect();

        let (state, reference) = vehicle_reference(&pose, &waypoints).unwrap();
        assert_relative_eq!(state.cte, 1.0, epsilon = 1e-9);
        assert_relative_eq!(state.epsi, 0.0, epsilon = 1e-9);
        assert_eq!(state.v, 12.0);
        assert_relative_eq!(reference.eval(10.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn reference_at_an_angle() {
        // Path along y = x, vehicle at the origin heading along +x
        let pose = Pose::new(0.0, 0.0, 0.0, 5.0);
        let waypoints: Vec<_> = (0..6).map(|i| (i as float, i as float)).collect();

        let (state, _) = vehicle_reference(&pose, &waypoints).unwrap();
        assert_relative_eq!(state.cte, 0.0, epsilon = 1e-9);
        assert_relative_eq!(state.epsi, -PI / 4.0, epsilon = 1e-9);
    }

    fn not_converged() -> Result<Actuation, MpcError> {
        Err(MpcError::NotConverged {
            status: Status::MaximumCpuTimeExceeded,
            cost: 10.0,
            best_effort: Actuation {
                steering: 0.2,
                acceleration: -0.5,
                predicted: vec![],
                cost: 10.0,
            },
        })
    }

    #[test]
    fn failure_policies() {
        let u = apply_policy(not_converged(), FailurePolicy::Zero).unwrap();
        assert_eq!(u, Actuators::default());

        let u = apply_policy(not_converged(), FailurePolicy::BestEffort).unwrap();
        assert_eq!(u, Actuators { delta: 0.2, a: -0.5 });
    }

    #[test]
    fn other_errors_are_fatal() {
        let result = Err(MpcError::InvalidState(VehicleState::default()));
        match apply_policy(result, FailurePolicy::BestEffort) {
            Err(Error::Mpc(MpcError::InvalidState(_))) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn converged_solution_passes_through() {
        let result = Ok(Actuation {
            steering: -0.1,
            acceleration: 0.7,
            predicted: vec![(1.0, 0.0)],
            cost: 1.0,
        });
        let u = apply_policy(result, FailurePolicy::Zero).unwrap();
        assert_eq!(u, Actuators { delta: -0.1, a: 0.7 });
    }
}
