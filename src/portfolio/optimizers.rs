//! # Portfolio Optimizers
//!
//! $$
//! \max_{\mathbf{w}}\ \mu^\top\mathbf{w}\ \ \text{s.t.}\ \ \lVert G\mathbf{w}\rVert_2\le\sigma
//! \qquad\text{or}\qquad
//! \min_{\mathbf{w}}\ \mathbf{w}^\top\Sigma\mathbf{w}\ \ \text{s.t.}\ \ \mu^\top\mathbf{w}\ge r
//! $$
//!
//! Single-level problems and the interchangeable backends that solve them.

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FrontierError;
use crate::error::Result;
use crate::moments::MomentsEstimate;

pub mod analytic;
pub mod conic;
pub mod nelder_mead;

pub use analytic::AnalyticBackend;
pub use conic::ClarabelBackend;
pub use nelder_mead::NelderMeadBackend;

/// What a single sweep level asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Objective {
  /// Global minimum-variance portfolio.
  MinVariance,
  /// Minimum variance with `mu'w >= target`.
  MinVarianceWithReturn(f64),
  /// Maximum return with `sqrt(w' Sigma w) <= sigma`.
  MaxReturnWithRisk(f64),
}

impl Objective {
  /// Target value carried into frontier points and failures.
  pub fn level(&self) -> f64 {
    match self {
      Self::MinVariance => 0.0,
      Self::MinVarianceWithReturn(r) => *r,
      Self::MaxReturnWithRisk(s) => *s,
    }
  }
}

/// Moments plus one objective. Full investment always applies.
#[derive(Clone, Debug)]
pub struct LevelProblem {
  pub mean: Array1<f64>,
  pub covariance: Array2<f64>,
  pub objective: Objective,
  pub allow_short: bool,
}

impl LevelProblem {
  pub fn new(
    mean: Array1<f64>,
    covariance: Array2<f64>,
    objective: Objective,
    allow_short: bool,
  ) -> Self {
    Self {
      mean,
      covariance,
      objective,
      allow_short,
    }
  }

  pub fn from_moments(moments: &MomentsEstimate, objective: Objective, allow_short: bool) -> Self {
    Self::new(
      moments.mean().clone(),
      moments.covariance().clone(),
      objective,
      allow_short,
    )
  }

  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  pub fn level(&self) -> f64 {
    self.objective.level()
  }

  pub fn with_objective(&self, objective: Objective) -> Self {
    Self {
      objective,
      ..self.clone()
    }
  }

  /// Same objective on the assets in `idx` only.
  pub fn restricted(&self, idx: &[usize]) -> Self {
    Self {
      mean: idx.iter().map(|&i| self.mean[i]).collect(),
      covariance: Array2::from_shape_fn((idx.len(), idx.len()), |(a, b)| {
        self.covariance[[idx[a], idx[b]]]
      }),
      objective: self.objective,
      allow_short: self.allow_short,
    }
  }

  pub(crate) fn infeasible(&self, reason: impl Into<String>) -> FrontierError {
    FrontierError::infeasible(self.level(), reason)
  }
}

/// A solver able to handle one [`LevelProblem`] at a time.
///
/// Returned weights are raw: the sweep cleans them and checks the budget.
pub trait SolverBackend: Send + Sync {
  fn name(&self) -> &'static str;

  fn solve(&self, problem: &LevelProblem) -> Result<Vec<f64>>;
}

/// Backend selector used by configs and the CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
  /// Interior-point QP/SOCP.
  #[default]
  Clarabel,
  /// Derivative-free penalty search.
  NelderMead,
  /// Closed-form Lagrangian, short sales only.
  Analytic,
}

impl SolverKind {
  pub fn backend(&self) -> Box<dyn SolverBackend> {
    match self {
      Self::Clarabel => Box::new(ClarabelBackend::default()),
      Self::NelderMead => Box::new(NelderMeadBackend::default()),
      Self::Analytic => Box::new(AnalyticBackend),
    }
  }
}

impl FromStr for SolverKind {
  type Err = FrontierError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().replace('_', "-").as_str() {
      "clarabel" | "conic" => Ok(Self::Clarabel),
      "nelder-mead" | "neldermead" | "nm" => Ok(Self::NelderMead),
      "analytic" | "closed-form" => Ok(Self::Analytic),
      other => Err(FrontierError::InvalidInput(format!("unknown solver '{other}'"))),
    }
  }
}

impl Display for SolverKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Clarabel => write!(f, "clarabel"),
      Self::NelderMead => write!(f, "nelder-mead"),
      Self::Analytic => write!(f, "analytic"),
    }
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  #[test]
  fn restricted_selects_submatrix() {
    let p = LevelProblem::new(
      array![0.1, 0.2, 0.3],
      array![[1.0, 0.1, 0.2], [0.1, 2.0, 0.3], [0.2, 0.3, 3.0]],
      Objective::MaxReturnWithRisk(0.5),
      false,
    );
    let r = p.restricted(&[0, 2]);
    assert_eq!(r.mean, array![0.1, 0.3]);
    assert_eq!(r.covariance, array![[1.0, 0.2], [0.2, 3.0]]);
    assert_eq!(r.level(), 0.5);
  }

  #[test]
  fn solver_kind_parsing() {
    assert_eq!("nelder_mead".parse::<SolverKind>().unwrap(), SolverKind::NelderMead);
    assert_eq!("Clarabel".parse::<SolverKind>().unwrap(), SolverKind::Clarabel);
    assert!("bonmin".parse::<SolverKind>().is_err());
    assert_eq!(SolverKind::default().backend().name(), "clarabel");
  }
}
