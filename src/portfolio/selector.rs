//! # Portfolio Selector
//!
//! $$
//! k_{\text{bal}} = \arg\min_k \left|\sigma_k - \tfrac12(\sigma_{\min}+\sigma_{\max})\right|
//! $$
//!
//! Picks the conservative, balanced and high-risk points of a frontier.

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use super::types::Frontier;
use super::types::FrontierPoint;
use super::types::Portfolio;
use super::types::PortfolioKind;
use super::types::SelectedPortfolios;
use crate::error::FrontierError;
use crate::error::Result;
use crate::market::Ticker;

/// Rule for the balanced pick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancedRule {
  /// Nearest to the middle of the risk range.
  #[default]
  RiskMidpoint,
  /// Highest Sharpe ratio.
  MaxSharpe,
  /// Point at index `len / 2`.
  MedianIndex,
}

impl FromStr for BalancedRule {
  type Err = FrontierError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().replace('_', "-").as_str() {
      "midpoint" | "risk-midpoint" => Ok(Self::RiskMidpoint),
      "max-sharpe" | "sharpe" => Ok(Self::MaxSharpe),
      "median" | "median-index" => Ok(Self::MedianIndex),
      other => Err(FrontierError::InvalidInput(format!(
        "unknown balanced rule '{other}'"
      ))),
    }
  }
}

impl Display for BalancedRule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::RiskMidpoint => write!(f, "midpoint"),
      Self::MaxSharpe => write!(f, "max-sharpe"),
      Self::MedianIndex => write!(f, "median"),
    }
  }
}

fn balanced_index(points: &[FrontierPoint], rule: BalancedRule) -> usize {
  match rule {
    BalancedRule::MedianIndex => points.len() / 2,
    BalancedRule::RiskMidpoint => {
      let lo = points[0].risk;
      let hi = points[points.len() - 1].risk;
      let target = 0.5 * (lo + hi);
      let mut best = 0;
      for (i, p) in points.iter().enumerate().skip(1) {
        if (p.risk - target).abs() < (points[best].risk - target).abs() {
          best = i;
        }
      }
      best
    }
    BalancedRule::MaxSharpe => {
      let mut best = 0;
      for (i, p) in points.iter().enumerate().skip(1) {
        if p.sharpe > points[best].sharpe {
          best = i;
        }
      }
      best
    }
  }
}

/// Select the named portfolios from a risk-ordered frontier.
pub fn select_portfolios(
  frontier: &Frontier,
  tickers: &[Ticker],
  rule: BalancedRule,
) -> Result<SelectedPortfolios> {
  let points = &frontier.points;
  if points.is_empty() {
    return Err(FrontierError::EmptyFrontier);
  }

  let pick = |kind: PortfolioKind, idx: usize| Portfolio {
    kind,
    tickers: tickers.to_vec(),
    point: points[idx].clone(),
  };

  Ok(SelectedPortfolios {
    conservative: pick(PortfolioKind::Conservative, 0),
    balanced: pick(PortfolioKind::Balanced, balanced_index(points, rule)),
    high_risk: pick(PortfolioKind::HighRisk, points.len() - 1),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frontier(risks_and_sharpes: &[(f64, f64)]) -> Frontier {
    Frontier {
      points: risks_and_sharpes
        .iter()
        .map(|&(risk, sharpe)| FrontierPoint {
          level: risk,
          weights: vec![1.0],
          expected_return: sharpe * risk,
          risk,
          sharpe,
        })
        .collect(),
      failures: Vec::new(),
    }
  }

  fn tickers() -> Vec<Ticker> {
    vec![Ticker::new("AAPL").unwrap()]
  }

  #[test]
  fn empty_frontier_is_an_error() {
    let err = select_portfolios(&Frontier::default(), &tickers(), BalancedRule::default());
    assert!(matches!(err, Err(FrontierError::EmptyFrontier)));
  }

  #[test]
  fn extremes_and_midpoint() {
    let f = frontier(&[(0.10, 0.5), (0.12, 0.6), (0.19, 0.7), (0.30, 0.4)]);
    let s = select_portfolios(&f, &tickers(), BalancedRule::RiskMidpoint).unwrap();

    assert_eq!(s.conservative.point.risk, 0.10);
    assert_eq!(s.high_risk.point.risk, 0.30);
    assert_eq!(s.balanced.point.risk, 0.19);
    assert_eq!(s.balanced.kind, PortfolioKind::Balanced);
  }

  #[test]
  fn midpoint_ties_go_to_lower_risk() {
    let f = frontier(&[(0.0, 0.0), (0.25, 1.0), (0.75, 1.0), (1.0, 1.0)]);
    let s = select_portfolios(&f, &tickers(), BalancedRule::RiskMidpoint).unwrap();
    assert_eq!(s.balanced.point.risk, 0.25);
  }

  #[test]
  fn max_sharpe_and_median_rules() {
    let f = frontier(&[(0.10, 0.5), (0.12, 0.9), (0.19, 0.9), (0.30, 0.4), (0.40, 0.3)]);
    let sharpe = select_portfolios(&f, &tickers(), BalancedRule::MaxSharpe).unwrap();
    assert_eq!(sharpe.balanced.point.risk, 0.12);

    let median = select_portfolios(&f, &tickers(), BalancedRule::MedianIndex).unwrap();
    assert_eq!(median.balanced.point.risk, 0.19);
  }

  #[test]
  fn single_point_frontier_names_it_three_times() {
    let f = frontier(&[(0.2, 0.5)]);
    let s = select_portfolios(&f, &tickers(), BalancedRule::default()).unwrap();
    assert_eq!(s.conservative.point, s.balanced.point);
    assert_eq!(s.balanced.point, s.high_risk.point);
  }

  #[test]
  fn rule_parsing() {
    assert_eq!("median".parse::<BalancedRule>().unwrap(), BalancedRule::MedianIndex);
    assert_eq!("max_sharpe".parse::<BalancedRule>().unwrap(), BalancedRule::MaxSharpe);
    assert!("random".parse::<BalancedRule>().is_err());
  }
}
