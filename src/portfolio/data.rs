//! # Portfolio Data Utilities
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w} = \lVert G\mathbf{w}\rVert_2^2
//! $$
//!
//! Dense helpers shared by the optimizers and the sweep.

use nalgebra::DMatrix;
use ndarray::Array2;

use super::types::BUDGET_TOL;

/// Negative weights above this are solver noise when shorting is off.
const NEGATIVE_DUST: f64 = -1e-7;

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn mat_vec_mul(mat: &Array2<f64>, v: &[f64]) -> Vec<f64> {
  mat
    .rows()
    .into_iter()
    .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
    .collect()
}

pub(crate) fn portfolio_variance(cov: &Array2<f64>, w: &[f64]) -> f64 {
  dot(w, &mat_vec_mul(cov, w))
}

pub(crate) fn portfolio_risk(cov: &Array2<f64>, w: &[f64]) -> f64 {
  portfolio_variance(cov, w).max(0.0).sqrt()
}

pub(crate) fn sharpe(expected_return: f64, risk: f64, risk_free: f64) -> f64 {
  if risk > 1e-15 {
    (expected_return - risk_free) / risk
  } else {
    0.0
  }
}

pub(crate) fn to_dmatrix(m: &Array2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

/// `G` with `w' Sigma w = |G w|^2`, negative eigenvalues clipped.
pub(crate) fn risk_factor(cov: &Array2<f64>) -> DMatrix<f64> {
  let eig = to_dmatrix(cov).symmetric_eigen();
  let sqrt_lambda = DMatrix::from_diagonal(&eig.eigenvalues.map(|l| l.max(0.0).sqrt()));
  sqrt_lambda * eig.eigenvectors.transpose()
}

/// Covariance with negative eigenvalues clipped to zero.
pub(crate) fn psd_projection(cov: &Array2<f64>) -> Array2<f64> {
  let eig = to_dmatrix(cov).symmetric_eigen();
  let lambda = DMatrix::from_diagonal(&eig.eigenvalues.map(|l| l.max(0.0)));
  let p = &eig.eigenvectors * lambda * eig.eigenvectors.transpose();
  Array2::from_shape_fn(cov.dim(), |(i, j)| 0.5 * (p[(i, j)] + p[(j, i)]))
}

/// Clip solver noise and renormalize.
///
/// Returns `None` when the vector is not finite, misses the budget by more
/// than `1e-4`, or holds a real short position while shorting is off.
pub(crate) fn clean_weights(w: &[f64], allow_short: bool) -> Option<Vec<f64>> {
  if w.is_empty() || w.iter().any(|v| !v.is_finite()) {
    return None;
  }

  let mut out = w.to_vec();
  if !allow_short {
    if out.iter().any(|&v| v < NEGATIVE_DUST) {
      return None;
    }
    for v in &mut out {
      *v = v.max(0.0);
    }
  }

  let sum: f64 = out.iter().sum();
  if (sum - 1.0).abs() > 1e-4 {
    return None;
  }
  if (sum - 1.0).abs() > BUDGET_TOL * 1e-3 {
    for v in &mut out {
      *v /= sum;
    }
  }
  Some(out)
}

/// Indices of the `k` largest weights by magnitude, ascending.
pub(crate) fn top_k(w: &[f64], k: usize) -> Vec<usize> {
  let mut idx: Vec<usize> = (0..w.len()).collect();
  idx.sort_by(|&a, &b| {
    w[b]
      .abs()
      .partial_cmp(&w[a].abs())
      .unwrap_or(std::cmp::Ordering::Equal)
      .then(a.cmp(&b))
  });
  idx.truncate(k);
  idx.sort_unstable();
  idx
}
