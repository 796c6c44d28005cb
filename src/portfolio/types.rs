//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*(\sigma)=\arg\max_{\mathbf{w}} \mu^\top\mathbf{w}\ \ \text{s.t.}\ \ \sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}\le\sigma,\ \mathbf{1}^\top\mathbf{w}=1
//! $$
//!
//! Shared constraint, frontier and selection containers.

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use crate::market::Ticker;

/// A weight at or below this is not counted as a holding.
pub const HOLDING_THRESHOLD: f64 = 1e-4;

/// Tolerance for the full-investment constraint.
pub const BUDGET_TOL: f64 = 1e-6;

/// Constraints applied at every sweep level. Full investment is always on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
  /// Allow negative weights.
  pub allow_short: bool,
  /// Cap on the number of held assets.
  pub max_assets: Option<usize>,
}

/// One solved sweep level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
  /// Target risk or target return this point was solved for.
  pub level: f64,
  pub weights: Vec<f64>,
  pub expected_return: f64,
  /// Standard deviation of the portfolio return.
  pub risk: f64,
  /// `(expected_return - risk_free) / risk`.
  pub sharpe: f64,
}

impl FrontierPoint {
  /// Number of weights above [`HOLDING_THRESHOLD`] in absolute value.
  pub fn holdings(&self) -> usize {
    self
      .weights
      .iter()
      .filter(|w| w.abs() > HOLDING_THRESHOLD)
      .count()
  }

  pub fn weight_sum(&self) -> f64 {
    self.weights.iter().sum()
  }
}

/// A sweep level that could not be solved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
  pub level: f64,
  pub reason: String,
}

/// Efficient frontier ordered by increasing risk, plus skipped levels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Frontier {
  pub points: Vec<FrontierPoint>,
  pub failures: Vec<SweepFailure>,
}

impl Frontier {
  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn risk_range(&self) -> Option<(f64, f64)> {
    Some((self.points.first()?.risk, self.points.last()?.risk))
  }
}

/// Named position on the frontier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortfolioKind {
  Conservative,
  Balanced,
  HighRisk,
}

impl PortfolioKind {
  pub const ALL: [PortfolioKind; 3] = [Self::Conservative, Self::Balanced, Self::HighRisk];

  /// File stem used for the allocation chart.
  pub fn file_stem(&self) -> &'static str {
    match self {
      Self::Conservative => "alloc_conservative",
      Self::Balanced => "alloc_balanced",
      Self::HighRisk => "alloc_highrisk",
    }
  }
}

impl Display for PortfolioKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Conservative => write!(f, "Conservative"),
      Self::Balanced => write!(f, "Balanced"),
      Self::HighRisk => write!(f, "High-Risk"),
    }
  }
}

/// A frontier point picked under a name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
  pub kind: PortfolioKind,
  pub tickers: Vec<Ticker>,
  pub point: FrontierPoint,
}

impl Portfolio {
  /// Ticker/weight pairs in input order.
  pub fn allocations(&self) -> impl Iterator<Item = (&Ticker, f64)> {
    self.tickers.iter().zip(self.point.weights.iter().copied())
  }
}

/// The three named portfolios of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedPortfolios {
  pub conservative: Portfolio,
  pub balanced: Portfolio,
  pub high_risk: Portfolio,
}

impl SelectedPortfolios {
  pub fn iter(&self) -> impl Iterator<Item = &Portfolio> {
    [&self.conservative, &self.balanced, &self.high_risk].into_iter()
  }

  pub fn get(&self, kind: PortfolioKind) -> &Portfolio {
    match kind {
      PortfolioKind::Conservative => &self.conservative,
      PortfolioKind::Balanced => &self.balanced,
      PortfolioKind::HighRisk => &self.high_risk,
    }
  }
}
