//! # Analytic Backend
//!
//! $$
//! \begin{pmatrix}2\Sigma & \mathbf 1 & \mu\\ \mathbf 1^\top & 0 & 0\\ \mu^\top & 0 & 0\end{pmatrix}
//! \begin{pmatrix}\mathbf w\\ \lambda_1\\ \lambda_2\end{pmatrix} =
//! \begin{pmatrix}\mathbf 0\\ 1\\ r\end{pmatrix}
//! $$
//!
//! Closed-form frontier when short sales are allowed. The optimal weights are
//! affine in the target return, so a risk level maps to the upper root of a
//! quadratic in `r`.

use nalgebra::DMatrix;
use nalgebra::DVector;

use super::LevelProblem;
use super::Objective;
use super::SolverBackend;
use crate::error::FrontierError;
use crate::error::Result;
use crate::portfolio::data::to_dmatrix;

const NAME: &str = "analytic";

#[derive(Clone, Copy, Debug, Default)]
pub struct AnalyticBackend;

struct Kkt {
  cov: DMatrix<f64>,
  mean: DVector<f64>,
}

impl Kkt {
  fn new(problem: &LevelProblem) -> Self {
    Self {
      cov: to_dmatrix(&problem.covariance),
      mean: DVector::from_iterator(problem.n_assets(), problem.mean.iter().copied()),
    }
  }

  fn n(&self) -> usize {
    self.mean.len()
  }

  fn variance(&self, w: &DVector<f64>) -> f64 {
    w.dot(&(&self.cov * w))
  }

  /// Means all equal: the return constraint is parallel to the budget.
  fn degenerate(&self) -> bool {
    let max = self.mean.max();
    let min = self.mean.min();
    max - min <= 1e-12 * max.abs().max(min.abs()).max(1.0)
  }

  /// Solve the stationarity system, with `target` adding the return row.
  fn solve(&self, target: Option<f64>) -> Option<DVector<f64>> {
    let n = self.n();
    let extra = if target.is_some() { 2 } else { 1 };
    let dim = n + extra;

    let mut m = DMatrix::zeros(dim, dim);
    m.view_mut((0, 0), (n, n)).copy_from(&(&self.cov * 2.0));
    for i in 0..n {
      m[(i, n)] = 1.0;
      m[(n, i)] = 1.0;
      if target.is_some() {
        m[(i, n + 1)] = self.mean[i];
        m[(n + 1, i)] = self.mean[i];
      }
    }
    let mut rhs = DVector::zeros(dim);
    rhs[n] = 1.0;
    if let Some(r) = target {
      rhs[n + 1] = r;
    }

    let x = match m.clone().lu().solve(&rhs) {
      Some(x) => x,
      None => m.clone().svd(true, true).solve(&rhs, 1e-14).ok()?,
    };
    let residual = (&m * &x - &rhs).norm();
    if !residual.is_finite() || residual > 1e-8 * (1.0 + rhs.norm()) {
      return None;
    }
    Some(x.rows(0, n).into_owned())
  }

  fn min_variance(&self, problem: &LevelProblem) -> Result<DVector<f64>> {
    self
      .solve(None)
      .ok_or_else(|| problem.infeasible("minimum-variance system is singular"))
  }
}

impl SolverBackend for AnalyticBackend {
  fn name(&self) -> &'static str {
    NAME
  }

  fn solve(&self, problem: &LevelProblem) -> Result<Vec<f64>> {
    if !problem.allow_short {
      return Err(FrontierError::unavailable(
        NAME,
        "closed form only covers portfolios with short sales allowed",
      ));
    }
    if problem.n_assets() == 0 {
      return Err(FrontierError::InvalidInput("empty problem".into()));
    }

    let kkt = Kkt::new(problem);
    let mv = kkt.min_variance(problem)?;

    let w = match problem.objective {
      Objective::MinVariance => mv,
      Objective::MinVarianceWithReturn(target) => {
        let mv_ret = kkt.mean.dot(&mv);
        if mv_ret >= target - 1e-12 {
          mv
        } else if kkt.degenerate() {
          return Err(problem.infeasible("all assets share one expected return"));
        } else {
          kkt
            .solve(Some(target))
            .ok_or_else(|| problem.infeasible("return-target system is singular"))?
        }
      }
      Objective::MaxReturnWithRisk(sigma) => {
        let mv_risk = kkt.variance(&mv).max(0.0).sqrt();
        if sigma.is_nan() || sigma < mv_risk * (1.0 - 1e-9) - 1e-12 {
          return Err(problem.infeasible(format!(
            "level is below the minimum attainable risk {mv_risk:.6}"
          )));
        }
        if kkt.degenerate() {
          mv
        } else {
          let w0 = kkt
            .solve(Some(0.0))
            .ok_or_else(|| problem.infeasible("return-target system is singular"))?;
          let w1 = kkt
            .solve(Some(1.0))
            .ok_or_else(|| problem.infeasible("return-target system is singular"))?;
          let slope = &w1 - &w0;

          // variance(r) = a r^2 + b r + c along the frontier
          let a = kkt.variance(&slope);
          let b = 2.0 * w0.dot(&(&kkt.cov * &slope));
          let c = kkt.variance(&w0);
          if a <= 1e-300 {
            mv
          } else {
            let disc = (b * b - 4.0 * a * (c - sigma * sigma)).max(0.0);
            let r = (-b + disc.sqrt()) / (2.0 * a);
            &w0 + slope * r
          }
        }
      }
    };

    Ok(w.iter().copied().collect())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::portfolio::data::dot;
  use crate::portfolio::data::portfolio_risk;
  use crate::portfolio::optimizers::ClarabelBackend;

  fn problem(objective: Objective) -> LevelProblem {
    LevelProblem::new(
      array![0.05, 0.10, 0.07],
      array![[0.04, 0.006, 0.004], [0.006, 0.09, 0.01], [0.004, 0.01, 0.16]],
      objective,
      true,
    )
  }

  #[test]
  fn long_only_is_unavailable() {
    let mut p = problem(Objective::MinVariance);
    p.allow_short = false;
    let err = AnalyticBackend.solve(&p).unwrap_err();
    assert!(matches!(err, FrontierError::SolverUnavailable { .. }));
  }

  #[test]
  fn perfectly_correlated_pair_reaches_zero_risk() {
    let p = LevelProblem::new(
      array![0.05, 0.10],
      array![[0.01, 0.02], [0.02, 0.04]],
      Objective::MinVariance,
      true,
    );
    let w = AnalyticBackend.solve(&p).unwrap();
    assert_abs_diff_eq!(w[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w[1], -1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(portfolio_risk(&p.covariance, &w), 0.0, epsilon = 1e-6);
  }

  #[test]
  fn return_target_is_hit_exactly() {
    let p = problem(Objective::MinVarianceWithReturn(0.12));
    let w = AnalyticBackend.solve(&p).unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(dot(&w, p.mean.as_slice().unwrap()), 0.12, epsilon = 1e-10);
  }

  #[test]
  fn risk_level_matches_conic_solution() {
    let p = problem(Objective::MaxReturnWithRisk(0.3));
    let closed = AnalyticBackend.solve(&p).unwrap();
    let conic = ClarabelBackend::default().solve(&p).unwrap();

    assert_abs_diff_eq!(portfolio_risk(&p.covariance, &closed), 0.3, epsilon = 1e-9);
    for (a, b) in closed.iter().zip(conic.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = 1e-5);
    }
  }

  #[test]
  fn risk_below_minimum_is_infeasible() {
    let err = AnalyticBackend
      .solve(&problem(Objective::MaxReturnWithRisk(0.01)))
      .unwrap_err();
    assert!(err.is_recoverable());
  }
}
