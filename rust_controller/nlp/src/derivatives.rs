use num_dual::{Dual64, HyperDual64};

use crate::Functional;
use prelude::*;

/// Cost value and gradient, one forward pass per variable.
pub fn cost_gradient<F: Functional>(f: &F, x: &[float]) -> (float, Vector) {
    let _guard = flame::start_guard("nlp gradient");
    let mut vars: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut grad = Vector::zeros(x.len());

    for i in 0..x.len() {
        vars[i].eps = 1.0;
        grad[i] = f.cost(&vars).eps;
        vars[i].eps = 0.0;
    }

    (f.cost(x), grad)
}

/// Dense cost Hessian. Each upper triangle entry takes one hyper-dual pass.
pub fn cost_hessian<F: Functional>(f: &F, x: &[float]) -> Matrix {
    let _guard = flame::start_guard("nlp hessian");
    let n = x.len();
    let mut vars: Vec<HyperDual64> = x.iter().map(|&v| HyperDual64::from(v)).collect();
    let mut H = Matrix::zeros(n, n);

    for i in 0..n {
        vars[i].eps1 = 1.0;
        for j in i..n {
            vars[j].eps2 = 1.0;
            let h = f.cost(&vars).eps1eps2;
            H[(i, j)] = h;
            H[(j, i)] = h;
            vars[j].eps2 = 0.0;
        }
        vars[i].eps1 = 0.0;
    }

    H
}

/// Constraint values and their Jacobian, one forward pass per variable.
pub fn constraint_jacobian<F: Functional>(f: &F, x: &[float]) -> (Vector, Matrix) {
    let _guard = flame::start_guard("nlp jacobian");
    let n = x.len();
    let m = f.n_constraints();
    let mut vars: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut g_dual = vec![Dual64::from(0.0); m];
    let mut J = Matrix::zeros(m, n);

    for j in 0..n {
        vars[j].eps = 1.0;
        f.constraints(&vars, &mut g_dual);
        for (i, g_i) in g_dual.iter().enumerate() {
            J[(i, j)] = g_i.eps;
        }
        vars[j].eps = 0.0;
    }

    let mut g = vec![0.0; m];
    f.constraints(x, &mut g);

    (Vector::from_vec(g), J)
}
