extern crate nalgebra;

#[allow(non_camel_case_types)]
pub type float = f64;
pub use std::f64::consts::PI;
pub use std::f64::{INFINITY, NAN};

pub type Matrix = nalgebra::DMatrix<float>;
pub type Vector = nalgebra::DVector<float>;

/// Returns the smaller of two values. NaN inputs return `a`.
pub fn min<T: Copy + PartialOrd>(a: T, b: T) -> T {
    match nalgebra::partial_min(&a, &b) {
        Some(&v) => v,
        None => a,
    }
}

/// Returns the larger of two values. NaN inputs return `a`.
pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    match nalgebra::partial_max(&a, &b) {
        Some(&v) => v,
        None => a,
    }
}

/// Infinity norm of a slice.
pub fn norm_inf(v: &[float]) -> float {
    v.iter().fold(0.0, |acc, &x| max(acc, x.abs()))
}

/// Wraps an angle into (-PI, PI].
pub fn wrap_angle(mut a: float) -> float {
    if !a.is_finite() {
        return a;
    }
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

pub fn duration_to_secs(d: std::time::Duration) -> float {
    d.as_secs() as float + float::from(d.subsec_nanos()) * 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_order() {
        assert_eq!(min(1.0, 2.0), 1.0);
        assert_eq!(max(1.0, 2.0), 2.0);
        assert_eq!(min(3, -3), -3);
    }

    #[test]
    fn norm_inf_takes_largest_magnitude() {
        assert_eq!(norm_inf(&[]), 0.0);
        assert_eq!(norm_inf(&[1.0, -4.0, 2.5]), 4.0);
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(-2.5 * PI) + 0.5 * PI).abs() < 1e-12);
    }
}
