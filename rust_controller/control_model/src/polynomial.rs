use num_dual::DualNum;

use prelude::*;
use crate::ModelError;

pub const COEFFICIENT_COUNT: usize = 4;

/// Cubic `c0 + c1 x + c2 x^2 + c3 x^3` approximating the desired path in the vehicle frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReferencePolynomial {
    coeffs: [float; COEFFICIENT_COUNT],
}

impl ReferencePolynomial {
    pub fn new(coeffs: &[float]) -> Result<ReferencePolynomial, ModelError> {
        if coeffs.len() != COEFFICIENT_COUNT {
            return Err(ModelError::CoefficientCount {
                expected: COEFFICIENT_COUNT,
                got: coeffs.len(),
            });
        }
        if let Some((index, &value)) = coeffs.iter().enumerate().find(|(_, c)| !c.is_finite()) {
            return Err(ModelError::NonFiniteCoefficient { index, value });
        }

        let mut c = [0.0; COEFFICIENT_COUNT];
        c.copy_from_slice(coeffs);
        Ok(ReferencePolynomial { coeffs: c })
    }

    pub fn coefficients(&self) -> &[float; COEFFICIENT_COUNT] {
        &self.coeffs
    }

    pub fn eval<D: DualNum<float> + Copy>(&self, x: D) -> D {
        let [c0, c1, c2, c3] = self.coeffs;
        ((D::from(c3) * x + c2) * x + c1) * x + c0
    }

    pub fn derivative<D: DualNum<float> + Copy>(&self, x: D) -> D {
        let [_, c1, c2, c3] = self.coeffs;
        (D::from(3.0 * c3) * x + 2.0 * c2) * x + c1
    }

    /// Heading of the reference path at `x`.
    pub fn heading<D: DualNum<float> + Copy>(&self, x: D) -> D {
        self.derivative(x).atan()
    }
}
