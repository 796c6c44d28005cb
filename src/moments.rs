//! # Moments
//!
//! $$
//! \hat\mu_i = \frac1T\sum_t r_{t,i}, \qquad
//! \hat\Sigma_{ij} = \frac1{T-1}\sum_t (r_{t,i}-\hat\mu_i)(r_{t,j}-\hat\mu_j)
//! $$
//!
//! Sample mean-return vector, covariance and correlation of an aligned
//! return matrix.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use crate::error::FrontierError;
use crate::error::Result;
use crate::market::Ticker;
use crate::portfolio::data;
use crate::returns::ReturnMatrix;

const SYMMETRY_TOL: f64 = 1e-9;

/// Mean vector, covariance and correlation estimated from one return matrix.
#[derive(Clone, Debug)]
pub struct MomentsEstimate {
  tickers: Vec<Ticker>,
  mean: Array1<f64>,
  covariance: Array2<f64>,
  correlation: Array2<f64>,
  n_periods: usize,
}

/// Estimate moments of `returns`.
///
/// Fails when fewer than two periods are available or when a column has a gap.
pub fn estimate_moments(returns: &ReturnMatrix) -> Result<MomentsEstimate> {
  let t = returns.n_periods();
  if returns.n_assets() == 0 {
    return Err(FrontierError::insufficient("return matrix has no tickers"));
  }
  if t < 2 {
    return Err(FrontierError::insufficient(format!(
      "need at least 2 return periods for a covariance, got {t}"
    )));
  }

  for (j, ticker) in returns.tickers.iter().enumerate() {
    let gaps = returns.column(j).iter().filter(|v| !v.is_finite()).count();
    if gaps > 0 {
      return Err(FrontierError::insufficient(format!(
        "{ticker} has {gaps} gap(s) after alignment"
      )));
    }
  }

  let mean = returns
    .values
    .mean_axis(Axis(0))
    .ok_or_else(|| FrontierError::insufficient("empty return matrix"))?;
  let covariance = returns
    .values
    .t()
    .cov(1.0)
    .map_err(|e| FrontierError::insufficient(e.to_string()))?;

  debug!(periods = t, assets = returns.n_assets(), "estimated moments");
  MomentsEstimate::from_parts(returns.tickers.clone(), mean, covariance, t)
}

pub(crate) fn corr_from_cov(cov: &Array2<f64>) -> Array2<f64> {
  let n = cov.nrows();
  let sd: Vec<f64> = (0..n).map(|i| cov[[i, i]].max(0.0).sqrt()).collect();
  Array2::from_shape_fn((n, n), |(i, j)| {
    if i == j {
      1.0
    } else {
      let denom = sd[i] * sd[j];
      if denom > 1e-15 {
        (cov[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    }
  })
}

impl MomentsEstimate {
  /// Build an estimate from known moments. The covariance is symmetrised.
  pub fn from_parts(
    tickers: Vec<Ticker>,
    mean: Array1<f64>,
    covariance: Array2<f64>,
    n_periods: usize,
  ) -> Result<Self> {
    let n = tickers.len();
    if n == 0 {
      return Err(FrontierError::InvalidInput("no tickers".into()));
    }
    if mean.len() != n || covariance.dim() != (n, n) {
      return Err(FrontierError::InvalidInput(format!(
        "moments shape mismatch: {n} tickers, mean of {}, covariance {:?}",
        mean.len(),
        covariance.dim()
      )));
    }
    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(FrontierError::insufficient("non-finite moment estimate"));
    }

    let scale = covariance.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    for i in 0..n {
      if covariance[[i, i]] < -SYMMETRY_TOL * scale {
        return Err(FrontierError::InvalidInput(format!(
          "negative variance for {}",
          tickers[i]
        )));
      }
      for j in (i + 1)..n {
        if (covariance[[i, j]] - covariance[[j, i]]).abs() > SYMMETRY_TOL * scale {
          return Err(FrontierError::InvalidInput(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    let covariance = (&covariance + &covariance.t()) / 2.0;
    let correlation = corr_from_cov(&covariance);

    Ok(Self {
      tickers,
      mean,
      covariance,
      correlation,
      n_periods,
    })
  }

  pub fn tickers(&self) -> &[Ticker] {
    &self.tickers
  }

  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn correlation(&self) -> &Array2<f64> {
    &self.correlation
  }

  pub fn n_periods(&self) -> usize {
    self.n_periods
  }

  pub fn n_assets(&self) -> usize {
    self.tickers.len()
  }

  /// Per-asset standard deviations.
  pub fn volatilities(&self) -> Array1<f64> {
    self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Scale per-period moments by `periods_per_year`.
  pub fn annualized(&self, periods_per_year: f64) -> Self {
    Self {
      tickers: self.tickers.clone(),
      mean: &self.mean * periods_per_year,
      covariance: &self.covariance * periods_per_year,
      correlation: self.correlation.clone(),
      n_periods: self.n_periods,
    }
  }

  /// Smallest eigenvalue of the covariance.
  pub fn min_eigenvalue(&self) -> f64 {
    data::to_dmatrix(&self.covariance)
      .symmetric_eigen()
      .eigenvalues
      .iter()
      .copied()
      .fold(f64::INFINITY, f64::min)
  }

  /// Whether the covariance is PSD up to `tol` relative to its largest entry.
  pub fn is_near_psd(&self, tol: f64) -> bool {
    let scale = self.covariance.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    self.min_eigenvalue() >= -tol * scale.max(1e-300)
  }

  /// Covariance with negative eigenvalues clipped to zero.
  pub fn psd_projection(&self) -> Array2<f64> {
    data::psd_projection(&self.covariance)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::array;

  use super::*;

  fn tickers(names: &[&str]) -> Vec<Ticker> {
    names.iter().map(|n| Ticker::new(n).unwrap()).collect()
  }

  fn matrix(values: Array2<f64>) -> ReturnMatrix {
    let dates = (0..values.nrows())
      .map(|i| NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Days::new(i as u64))
      .collect();
    let names: Vec<String> = (0..values.ncols()).map(|j| format!("T{j}")).collect();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    ReturnMatrix::new(dates, tickers(&refs), values).unwrap()
  }

  #[test]
  fn sample_mean_and_covariance() {
    let r = matrix(array![[0.01, 0.02], [0.03, 0.00], [0.02, 0.04]]);
    let m = estimate_moments(&r).unwrap();

    assert_abs_diff_eq!(m.mean()[0], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(m.mean()[1], 0.02, epsilon = 1e-12);
    // ddof = 1
    assert_abs_diff_eq!(m.covariance()[[0, 0]], 1e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[1, 1]], 4e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[0, 1]], -1e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[1, 0]], m.covariance()[[0, 1]], epsilon = 0.0);
    assert_abs_diff_eq!(m.correlation()[[0, 1]], -0.5, epsilon = 1e-12);
    assert_eq!(m.n_periods(), 3);
  }

  #[test]
  fn rejects_single_period() {
    let r = matrix(array![[0.01, 0.02]]);
    let err = estimate_moments(&r).unwrap_err();
    assert!(matches!(err, FrontierError::InsufficientData { .. }));
  }

  #[test]
  fn rejects_gaps_and_names_ticker() {
    let r = matrix(array![[0.01, 0.02], [f64::NAN, 0.00], [0.02, 0.04]]);
    let err = estimate_moments(&r).unwrap_err();
    assert!(err.to_string().contains("T0"));
  }

  #[test]
  fn from_parts_validates_shape_and_symmetry() {
    let t = tickers(&["A", "B"]);
    assert!(MomentsEstimate::from_parts(t.clone(), array![0.1], array![[1.0]], 10).is_err());
    assert!(MomentsEstimate::from_parts(
      t.clone(),
      array![0.1, 0.2],
      array![[0.04, 0.01], [0.02, 0.09]],
      10
    )
    .is_err());
    assert!(MomentsEstimate::from_parts(
      t,
      array![0.1, 0.2],
      array![[0.04, 0.01], [0.01, 0.09]],
      10
    )
    .is_ok());
  }

  #[test]
  fn annualization_scales_mean_and_covariance() {
    let m = MomentsEstimate::from_parts(
      tickers(&["A"]),
      array![0.01],
      array![[0.0004]],
      24,
    )
    .unwrap()
    .annualized(12.0);

    assert_abs_diff_eq!(m.mean()[0], 0.12, epsilon = 1e-12);
    assert_abs_diff_eq!(m.covariance()[[0, 0]], 0.0048, epsilon = 1e-12);
  }

  #[test]
  fn psd_projection_clips_negative_eigenvalues() {
    // eigenvalues 3 and -1
    let m = MomentsEstimate::from_parts(
      tickers(&["A", "B"]),
      array![0.0, 0.0],
      array![[1.0, 2.0], [2.0, 1.0]],
      10,
    )
    .unwrap();
    assert!(!m.is_near_psd(1e-9));

    let p = m.psd_projection();
    assert_abs_diff_eq!(p[[0, 0]], 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(p[[0, 1]], 1.5, epsilon = 1e-9);
    assert!(m.annualized(12.0).min_eigenvalue() < 0.0);
  }
}
