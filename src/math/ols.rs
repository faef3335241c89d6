//! Linear solves used by the fitter.
//!
//! Each Levenberg–Marquardt step solves a small damped normal system
//!
//! ```text
//! (α + λ·diag(α)) · δ = β
//! ```
//!
//! whose size is the number of fitted parameters (typically 3–12).
//!
//! Implementation choices:
//! - We use SVD so that nearly singular systems (e.g. a peak whose height went
//!   to zero, making its center unidentifiable) still give a finite step.
//! - The same decomposition provides the pseudo-inverse used for the
//!   covariance matrix after a fit.

use nalgebra::{DMatrix, DVector};

/// Solve a (least squares) linear system using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Pseudo-inverse of a square matrix, `None` if it cannot be computed.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = m.clone().pseudo_inverse(1e-12).ok()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn pseudo_inverse_of_diagonal() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.5]);
        let inv = pseudo_inverse(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 2.0).abs() < 1e-12);
    }
}
