//! # Portfolio Engine
//!
//! $$
//! (\mu, \Sigma) \xrightarrow{\ \text{sweep}\ } \mathcal F \xrightarrow{\ \text{rule}\ } (\mathbf w_{\text{cons}}, \mathbf w_{\text{bal}}, \mathbf w_{\text{high}})
//! $$
//!
//! High-level orchestration API for backend selection, frontier sweeps and
//! portfolio picks.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::frontier::min_variance_portfolio;
use super::frontier::FrontierSolver;
use super::frontier::Sweep;
use super::optimizers::SolverKind;
use super::selector::select_portfolios;
use super::selector::BalancedRule;
use super::types::Constraints;
use super::types::Frontier;
use super::types::FrontierPoint;
use super::types::SelectedPortfolios;
use crate::error::FrontierError;
use crate::error::Result;
use crate::moments::MomentsEstimate;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioEngineConfig {
  /// Backend solving each sweep level.
  pub solver: SolverKind,
  /// Levels to trace.
  pub sweep: Sweep,
  /// Short-sale and holding-count constraints.
  pub constraints: Constraints,
  /// Risk-free rate used in Sharpe computations.
  pub risk_free: f64,
  /// Rule picking the balanced portfolio.
  pub balanced: BalancedRule,
  /// Draw a progress bar while sweeping.
  pub show_progress: bool,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      solver: SolverKind::Clarabel,
      sweep: Sweep::default(),
      constraints: Constraints::default(),
      risk_free: 0.0,
      balanced: BalancedRule::RiskMidpoint,
      show_progress: false,
    }
  }
}

/// Frontier and named portfolios of one engine run.
#[derive(Clone, Debug)]
pub struct EngineOutput {
  pub frontier: Frontier,
  pub portfolios: SelectedPortfolios,
}

/// Single entry-point engine for frontier workflows.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Reject configurations that cannot produce a frontier.
  pub fn validate(&self) -> Result<()> {
    self.config.sweep.validate()?;
    if self.config.constraints.max_assets == Some(0) {
      return Err(FrontierError::InvalidInput(
        "max_assets must be at least 1".into(),
      ));
    }
    if self.config.solver == SolverKind::Analytic && !self.config.constraints.allow_short {
      return Err(FrontierError::unavailable(
        "analytic",
        "closed form only covers portfolios with short sales allowed",
      ));
    }
    if !self.config.risk_free.is_finite() {
      return Err(FrontierError::InvalidInput("risk-free rate must be finite".into()));
    }
    Ok(())
  }

  /// Global minimum-variance portfolio under the configured constraints.
  pub fn min_variance(&self, moments: &MomentsEstimate) -> Result<FrontierPoint> {
    let backend = self.config.solver.backend();
    min_variance_portfolio(moments, backend.as_ref(), &self.config.constraints)
  }

  /// Trace the configured sweep.
  pub fn trace(&self, moments: &MomentsEstimate) -> Result<Frontier> {
    self.validate()?;
    let backend = self.config.solver.backend();
    FrontierSolver::new(
      backend.as_ref(),
      self.config.constraints,
      self.config.risk_free,
    )
    .with_progress(self.config.show_progress)
    .trace(moments, &self.config.sweep)
  }

  /// Pick the named portfolios from a traced frontier.
  pub fn select(&self, frontier: &Frontier, moments: &MomentsEstimate) -> Result<SelectedPortfolios> {
    select_portfolios(frontier, moments.tickers(), self.config.balanced)
  }

  /// Trace and select in one call.
  pub fn run(&self, moments: &MomentsEstimate) -> Result<EngineOutput> {
    let frontier = self.trace(moments)?;
    let portfolios = self.select(&frontier, moments)?;
    info!(
      conservative_risk = portfolios.conservative.point.risk,
      balanced_risk = portfolios.balanced.point.risk,
      high_risk = portfolios.high_risk.point.risk,
      "selected portfolios"
    );
    Ok(EngineOutput {
      frontier,
      portfolios,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::market::Ticker;

  fn moments() -> MomentsEstimate {
    let tickers = ["AAA", "BBB", "CCC"]
      .iter()
      .map(|t| Ticker::new(t).unwrap())
      .collect();
    MomentsEstimate::from_parts(
      tickers,
      array![0.008, 0.012, 0.018],
      array![[0.0025, 0.0005, 0.0004], [0.0005, 0.0049, 0.0010], [0.0004, 0.0010, 0.0100]],
      36,
    )
    .unwrap()
  }

  #[test]
  fn default_config_round_trips_through_json() {
    let config = PortfolioEngineConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"risk-grid\""));
    let back: PortfolioEngineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let partial: PortfolioEngineConfig =
      serde_json::from_str(r#"{"solver": "nelder-mead", "sweep": {"kind": "risk", "levels": [0.06, 0.08]}}"#)
        .unwrap();
    assert_eq!(partial.solver, SolverKind::NelderMead);
    assert_eq!(partial.balanced, BalancedRule::RiskMidpoint);
  }

  #[test]
  fn analytic_long_only_fails_before_solving() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      solver: SolverKind::Analytic,
      ..Default::default()
    });
    let err = engine.run(&moments()).unwrap_err();
    assert!(matches!(err, FrontierError::SolverUnavailable { .. }));
  }

  #[test]
  fn engine_runs_frontier_pipeline() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let out = engine.run(&moments()).unwrap();

    assert!(out.frontier.len() > 2);
    for p in out.portfolios.iter() {
      assert_abs_diff_eq!(p.point.weight_sum(), 1.0, epsilon = 1e-8);
      assert_eq!(p.tickers.len(), 3);
    }
    assert!(out.portfolios.conservative.point.risk <= out.portfolios.balanced.point.risk);
    assert!(out.portfolios.balanced.point.risk <= out.portfolios.high_risk.point.risk);

    let mv = engine.min_variance(&moments()).unwrap();
    assert_abs_diff_eq!(mv.risk, out.portfolios.conservative.point.risk, epsilon = 1e-6);
  }

  #[test]
  fn nelder_mead_and_analytic_backends_trace_frontiers() {
    let nm = PortfolioEngine::new(PortfolioEngineConfig {
      solver: SolverKind::NelderMead,
      sweep: Sweep::RiskGrid { points: 6 },
      ..Default::default()
    });
    let frontier = nm.trace(&moments()).unwrap();
    assert!(!frontier.is_empty());
    assert!(frontier
      .points
      .iter()
      .all(|p| p.weights.iter().all(|&w| w >= 0.0)));

    let analytic = PortfolioEngine::new(PortfolioEngineConfig {
      solver: SolverKind::Analytic,
      constraints: Constraints {
        allow_short: true,
        max_assets: None,
      },
      ..Default::default()
    });
    let frontier = analytic.trace(&moments()).unwrap();
    assert!(frontier.failures.is_empty());
    for pair in frontier.points.windows(2) {
      assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
    }
  }
}
