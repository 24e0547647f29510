use control_model::Pose;
use thiserror::Error;

use prelude::*;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("fitting order {order} needs at least {needed} points, got {got}")]
    NotEnoughPoints {
        order: usize,
        needed: usize,
        got: usize,
    },
    #[error("least squares solve failed: {0}")]
    Solve(&'static str),
}

/// Closed loop of waypoints around an ellipse centred on the origin, anticlockwise from
/// `(radius_x, 0)`.
#[derive(Clone, Debug)]
pub struct Track {
    waypoints: Vec<(float, float)>,
}

impl Track {
    pub fn ellipse(radius_x: float, radius_y: float, n: usize) -> Track {
        let waypoints = (0..n)
            .map(|i| {
                let theta = 2.0 * PI * i as float / n as float;
                (radius_x * theta.cos(), radius_y * theta.sin())
            })
            .collect();
        Track { waypoints }
    }

    pub fn waypoints(&self) -> &[(float, float)] {
        &self.waypoints
    }

    /// `n` consecutive waypoints starting from the one nearest to `(x, y)`.
    pub fn ahead(&self, x: float, y: float, n: usize) -> Vec<(float, float)> {
        let dist2 = |&(wx, wy): &(float, float)| (wx - x) * (wx - x) + (wy - y) * (wy - y);
        let nearest = self
            .waypoints
            .iter()
            .enumerate()
            .fold((0, INFINITY), |best, (i, w)| {
                let d = dist2(w);
                if d < best.1 {
                    (i, d)
                } else {
                    best
                }
            })
            .0;

        self.waypoints
            .iter()
            .cycle()
            .skip(nearest)
            .take(n)
            .cloned()
            .collect()
    }
}

/// Expresses world frame points relative to the vehicle, x forward and y to the left.
pub fn to_vehicle_frame(pose: &Pose, points: &[(float, float)]) -> Vec<(float, float)> {
    let (sin_psi, cos_psi) = pose[2].sin_cos();
    points
        .iter()
        .map(|&(x, y)| {
            let dx = x - pose[0];
            let dy = y - pose[1];
            (dx * cos_psi + dy * sin_psi, -dx * sin_psi + dy * cos_psi)
        })
        .collect()
}

/// Least squares polynomial through `points`, coefficients in ascending powers.
pub fn polyfit(points: &[(float, float)], order: usize) -> Result<Vec<float>, FitError> {
    let needed = order + 1;
    if points.len() < needed {
        return Err(FitError::NotEnoughPoints {
            order,
            needed,
            got: points.len(),
        });
    }

    let A = Matrix::from_fn(points.len(), needed, |i, j| points[i].0.powi(j as i32));
    let b = Vector::from_iterator(points.len(), points.iter().map(|p| p.1));
    let coeffs = A.svd(true, true).solve(&b, 1e-12).map_err(FitError::Solve)?;

    Ok(coeffs.iter().cloned().collect())
}
