// Kinematic bicycle model referenced to the front axle distance Lf.

use nalgebra::Vector4;
use num_dual::DualNum;

use crate::{Actuators, ReferencePolynomial, VehicleState};
use prelude::*;

/// World frame pose and speed `[x, y, psi, v]` used when integrating the continuous model.
pub type Pose = Vector4<float>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KinematicBicycle {
    pub Lf: float,
}

impl KinematicBicycle {
    pub fn new(Lf: float) -> KinematicBicycle {
        KinematicBicycle { Lf }
    }

    /// One explicit Euler step of the discrete model, including the tracking errors against
    /// `reference`. Written over `D` so the same arithmetic yields derivatives when `D` is a
    /// dual number.
    pub fn predict<D: DualNum<float> + Copy>(
        &self,
        dt: float,
        s: &VehicleState<D>,
        u: &Actuators<D>,
        reference: &ReferencePolynomial,
    ) -> VehicleState<D> {
        let f0 = reference.eval(s.x);
        let psides0 = reference.heading(s.x);
        let turn = s.v * u.delta * (dt / self.Lf);

        VehicleState {
            x: s.x + s.v * s.psi.cos() * dt,
            y: s.y + s.v * s.psi.sin() * dt,
            psi: s.psi + turn,
            v: s.v + u.a * dt,
            cte: (f0 - s.y) + s.v * s.epsi.sin() * dt,
            epsi: (s.psi - psides0) + turn,
        }
    }

    // Returns the time derivative of the pose
    pub fn state_equation(&self, x: &Pose, u: &Actuators) -> Pose {
        let (psi, v) = (x[2], x[3]);
        let (sin_psi, cos_psi) = psi.sin_cos();

        Vector4::new(v * cos_psi, v * sin_psi, v / self.Lf * u.delta, u.a)
    }

    pub fn step(&self, dt: float, x: &Pose, u: &Actuators) -> Pose {
        rk4(dt, 5, x, |x| self.state_equation(x, u))
    }
}

fn rk4<F>(dt: float, num_steps: u32, y_0: &Pose, mut f: F) -> Pose
where
    F: FnMut(&Pose) -> Pose,
{
    let h = dt / float::from(num_steps);
    let mut y = *y_0;
    for _ in 0..num_steps {
        let k1 = f(&y) * h;
        let k2 = f(&(y + 0.5 * k1)) * h;
        let k3 = f(&(y + 0.5 * k2)) * h;
        let k4 = f(&(y + k3)) * h;
        y += (k1 + 2.0 * (k2 + k3) + k4) / 6.0;
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_dual::Dual64;

    fn flat() -> ReferencePolynomial {
        ReferencePolynomial::new(&[0.0; 4]).unwrap()
    }

    #[test]
    fn predict_straight_line() {
        let model = KinematicBicycle::new(2.67);
        let s = VehicleState {
            v: 10.0,
            ..Default::default()
        };
        let next = model.predict(0.1, &s, &Actuators { delta: 0.0, a: 1.0 }, &flat());

        assert_relative_eq!(next.x, 1.0);
        assert_relative_eq!(next.y, 0.0);
        assert_relative_eq!(next.psi, 0.0);
        assert_relative_eq!(next.v, 10.1);
        assert_relative_eq!(next.cte, 0.0);
        assert_relative_eq!(next.epsi, 0.0);
    }

    #[test]
    fn predict_tracking_errors() {
        let model = KinematicBicycle::new(2.0);
        let reference = ReferencePolynomial::new(&[1.0, 0.5, 0.0, 0.0]).unwrap();
        let s = VehicleState {
            x: 2.0,
            y: 0.5,
            psi: 0.1,
            v: 4.0,
            cte: 0.0,
            epsi: 0.2,
        };
        let u = Actuators { delta: 0.05, a: 0.0 };
        let next = model.predict(0.1, &s, &u, &reference);

        let turn = 4.0 * 0.05 / 2.0 * 0.1;
        assert_relative_eq!(next.psi, 0.1 + turn);
        assert_relative_eq!(next.cte, (2.0 - 0.5) + 4.0 * (0.2 as float).sin() * 0.1);
        assert_relative_eq!(next.epsi, 0.1 - (0.5 as float).atan() + turn);
    }

    #[test]
    fn steering_sensitivity_scales_with_speed() {
        let model = KinematicBicycle::new(2.67);
        let zero = Dual64::from(0.0);
        let s = VehicleState::from_array([zero, zero, zero, Dual64::from(10.0), zero, zero]);
        let u = Actuators {
            delta: Dual64::new(0.0, 1.0),
            a: zero,
        };
        let next = model.predict(0.1, &s, &u, &flat());

        assert_relative_eq!(next.psi.eps, 10.0 / 2.67 * 0.1);
        assert_relative_eq!(next.epsi.eps, 10.0 / 2.67 * 0.1);
        assert_relative_eq!(next.x.eps, 0.0);
    }

    #[test]
    fn step_follows_circle() {
        let Lf = 2.5;
        let delta = 0.2;
        let v = 5.0;
        let model = KinematicBicycle::new(Lf);
        let u = Actuators { delta, a: 0.0 };

        // Turning radius is v / psi_dot
        let radius = Lf / delta;
        let mut x = Pose::new(0.0, 0.0, 0.0, v);
        for _ in 0..50 {
            x = model.step(0.1, &x, &u);
        }

        let distance_from_centre = (x[0] * x[0] + (x[1] - radius) * (x[1] - radius)).sqrt();
        assert_relative_eq!(distance_from_centre, radius, epsilon = 1e-6);
        assert_relative_eq!(x[2], v / Lf * delta * 5.0, epsilon = 1e-9);
        assert_relative_eq!(x[3], v);
    }
}
