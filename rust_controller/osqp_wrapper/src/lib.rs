extern crate flame;
extern crate osqp as osqp_inner;
extern crate prelude;
extern crate thiserror;

use self::osqp_inner::Problem as InnerProblem;
pub use self::osqp_inner::{CscMatrix, Settings, SetupError};
use self::osqp_inner::Status;
use thiserror::Error;

use prelude::*;

#[derive(Debug, Error)]
pub enum QpError {
    #[error("osqp setup failed: {0:?}")]
    Setup(SetupError),
    #[error("qp is primal infeasible")]
    PrimalInfeasible,
    #[error("qp is dual infeasible")]
    DualInfeasible,
    #[error("qp is non convex")]
    NonConvex,
    #[error("osqp returned an unknown status")]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QpStatus {
    Solved,
    SolvedInaccurate,
    MaxIterationsReached,
    TimeLimitReached,
}

/// Owned copy of an OSQP solution so the problem can be reused or dropped.
#[derive(Clone, Debug)]
pub struct QpSolution {
    pub status: QpStatus,
    pub x: Vec<float>,
    pub y: Vec<float>,
}

/// Minimises `1/2 x'Px + q'x` subject to `l <= Ax <= u`.
#[allow(non_snake_case)]
pub struct Problem {
    inner: InnerProblem,
}

impl Problem {
    /// Only the upper triangle of `P` is read.
    #[allow(non_snake_case)]
    pub fn new(
        P: &Matrix,
        q: &[float],
        A: &Matrix,
        l: &[float],
        u: &[float],
        settings: &Settings,
    ) -> Result<Problem, QpError> {
        let _guard = flame::start_guard("osqp setup");
        let inner = InnerProblem::new(
            csc_from_dense(P, true),
            q,
            csc_from_dense(A, false),
            l,
            u,
            settings,
        ).map_err(QpError::Setup)?;
        Ok(Problem { inner })
    }

    pub fn solve(&mut self) -> Result<QpSolution, QpError> {
        let _guard = flame::start_guard("osqp solve");
        let (status, solution) = match self.inner.solve() {
            Status::Solved(solution) => (QpStatus::Solved, solution),
            Status::SolvedInaccurate(solution) => (QpStatus::SolvedInaccurate, solution),
            Status::MaxIterationsReached(solution) => (QpStatus::MaxIterationsReached, solution),
            Status::TimeLimitReached(solution) => (QpStatus::TimeLimitReached, solution),
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                return Err(QpError::PrimalInfeasible)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                return Err(QpError::DualInfeasible)
            }
            Status::NonConvex(_) => return Err(QpError::NonConvex),
            _ => return Err(QpError::Unknown),
        };
        Ok(QpSolution {
            status,
            x: solution.x().to_vec(),
            y: solution.y().to_vec(),
        })
    }
}

/// Converts a dense matrix to compressed sparse column form, dropping exact zeros. With
/// `upper_triangular` set only entries on or above the diagonal are kept, as OSQP expects
/// for the quadratic cost.
pub fn csc_from_dense(m: &Matrix, upper_triangular: bool) -> CscMatrix<'static> {
    let (nrows, ncols) = m.shape();
    let mut indptr = Vec::with_capacity(ncols + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();

    indptr.push(0);
    for j in 0..ncols {
        let last_row = if upper_triangular { min(j + 1, nrows) } else { nrows };
        for i in 0..last_row {
            let v = m[(i, j)];
            if v != 0.0 {
                indices.push(i);
                data.push(v);
            }
        }
        indptr.push(data.len());
    }

    CscMatrix {
        nrows,
        ncols,
        indptr: indptr.into(),
        indices: indices.into(),
        data: data.into(),
    }
}
