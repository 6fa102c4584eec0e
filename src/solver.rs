//! Linear solvers for the diffusion steps.
//!
//! The diffusion operator is sparse and not symmetric in general
//! (the neighbor rotations make the 2x2 coupling blocks antisymmetric),
//! so the default solver is BiCGSTAB rather than conjugate gradients.

use nalgebra as na;
use nalgebra_sparse as nas;

/// Error in solving a linear system.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The right-hand side doesn't have one entry per matrix row,
    /// or the matrix isn't square.
    #[error("cannot solve a {rows}x{cols} system with a right-hand side of length {rhs_len}")]
    DimensionMismatch {
        /// Number of rows in the matrix.
        rows: usize,
        /// Number of columns in the matrix.
        cols: usize,
        /// Length of the right-hand side.
        rhs_len: usize,
    },
    /// The matrix has no inverse.
    #[error("the system matrix is singular")]
    Singular,
    /// An iterative solver ran out of iterations.
    #[error("no convergence after {iterations} iterations, relative residual = {residual}")]
    NotConverged {
        /// Number of iterations run.
        iterations: usize,
        /// Relative residual norm at the last iteration.
        residual: f64,
    },
    /// An iterative solver hit a division by zero.
    #[error("solver broke down at iteration {iteration}")]
    Breakdown {
        /// Iteration at which the breakdown occurred.
        iteration: usize,
    },
}

/// A method of solving a sparse linear system `Ax = b`.
pub trait LinearSolver {
    /// Solve the system with the given matrix and right-hand side.
    fn solve(
        &mut self,
        matrix: &nas::CsrMatrix<f64>,
        rhs: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, SolverError>;
}

fn check_dimensions(
    matrix: &nas::CsrMatrix<f64>,
    rhs: &na::DVector<f64>,
) -> Result<(), SolverError> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(SolverError::DimensionMismatch {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            rhs_len: rhs.len(),
        });
    }
    Ok(())
}

/// Below this magnitude a denominator counts as zero.
const BREAKDOWN_LIMIT: f64 = 1e-300;

/// Jacobi-preconditioned BiCGSTAB.
///
/// The iteration starts from the right-hand side,
/// which is a good guess for the diffusion operator
/// since it is close to the identity.
#[derive(Clone, Copy, Debug)]
pub struct BiCgStab {
    /// Maximum number of iterations before giving up.
    pub max_iterations: usize,
    /// Convergence threshold for the residual norm relative to the right-hand side.
    pub tolerance: f64,
}

impl Default for BiCgStab {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-12,
        }
    }
}

impl LinearSolver for BiCgStab {
    fn solve(
        &mut self,
        matrix: &nas::CsrMatrix<f64>,
        rhs: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, SolverError> {
        check_dimensions(matrix, rhs)?;

        let rhs_norm = rhs.norm();
        if rhs_norm == 0.0 {
            return Ok(na::DVector::zeros(rhs.len()));
        }
        let threshold = self.tolerance * rhs_norm;

        // inverse diagonal for the preconditioner,
        // falling back to identity on zero diagonals
        let mut inv_diag = na::DVector::from_element(matrix.nrows(), 1.0);
        for (row, _, &val) in matrix.diagonal_as_csr().triplet_iter() {
            if val.abs() > BREAKDOWN_LIMIT {
                inv_diag[row] = 1.0 / val;
            }
        }
        let precondition = |v: &na::DVector<f64>| v.component_mul(&inv_diag);

        let mut x = rhs.clone();
        let mut r = rhs - matrix * &x;
        let mut residual = r.norm();
        if residual <= threshold {
            return Ok(x);
        }
        let r_hat = r.clone();

        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = na::DVector::zeros(rhs.len());
        let mut p = na::DVector::zeros(rhs.len());

        for iteration in 0..self.max_iterations {
            let rho_next = r_hat.dot(&r);
            if rho_next.abs() < BREAKDOWN_LIMIT {
                return Err(SolverError::Breakdown { iteration });
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;
            p = &r + beta * (&p - omega * &v);

            let p_pre = precondition(&p);
            v = matrix * &p_pre;
            let r_hat_v = r_hat.dot(&v);
            if r_hat_v.abs() < BREAKDOWN_LIMIT {
                return Err(SolverError::Breakdown { iteration });
            }
            alpha = rho / r_hat_v;

            let s = &r - alpha * &v;
            if s.norm() <= threshold {
                x += alpha * p_pre;
                return Ok(x);
            }

            let s_pre = precondition(&s);
            let t = matrix * &s_pre;
            let t_t = t.dot(&t);
            if t_t < BREAKDOWN_LIMIT {
                return Err(SolverError::Breakdown { iteration });
            }
            omega = t.dot(&s) / t_t;

            x += alpha * p_pre + omega * s_pre;
            r = s - omega * t;
            residual = r.norm();
            if residual <= threshold {
                return Ok(x);
            }
            if omega.abs() < BREAKDOWN_LIMIT {
                return Err(SolverError::Breakdown { iteration });
            }
        }

        Err(SolverError::NotConverged {
            iterations: self.max_iterations,
            residual: residual / rhs_norm,
        })
    }
}

/// Direct solver converting the matrix to dense form and LU-factorizing it.
///
/// Only practical for small systems, but useful as a reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseLu;

impl LinearSolver for DenseLu {
    fn solve(
        &mut self,
        matrix: &nas::CsrMatrix<f64>,
        rhs: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, SolverError> {
        check_dimensions(matrix, rhs)?;
        let dense = na::DMatrix::from(matrix);
        dense.lu().solve(rhs).ok_or(SolverError::Singular)
    }
}
