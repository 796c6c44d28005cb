//! # Efficient Frontier
//!
//! $$
//! \mathcal F = \{(\sigma(\mathbf w_k^\*),\ \mu^\top\mathbf w_k^\*)\}_{k},\qquad
//! \mathbf w_k^\* = \text{solve}(\text{level}_k)
//! $$
//!
//! Sweeps target levels through a [`SolverBackend`], enforces the holding cap,
//! and keeps the efficient branch ordered by risk.

use std::cmp::Ordering;

use indicatif::ProgressBar;
use indicatif::ProgressStyle;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::data::clean_weights;
use super::data::dot;
use super::data::portfolio_risk;
use super::data::sharpe;
use super::data::top_k;
use super::optimizers::LevelProblem;
use super::optimizers::Objective;
use super::optimizers::SolverBackend;
use super::types::Constraints;
use super::types::Frontier;
use super::types::FrontierPoint;
use super::types::SweepFailure;
use super::types::HOLDING_THRESHOLD;
use crate::error::FrontierError;
use crate::error::Result;
use crate::moments::MomentsEstimate;

/// Points dropped when their return trails a lower-risk point by more.
const DOMINANCE_TOL: f64 = 1e-9;

/// Weight vectors closer than this are the same portfolio.
const SAME_WEIGHTS_TOL: f64 = 1e-7;

/// Upper bound on the number of levels a single sweep may request.
pub const MAX_SWEEP_LEVELS: usize = 10_000;

fn return_level_span(start: f64, end: f64, step: f64, extension: f64) -> f64 {
  ((end + extension - start) / step + 1e-9).floor()
}

/// Sequence of levels traced by a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Sweep {
  /// Explicit, strictly increasing target risks.
  Risk { levels: Vec<f64> },
  /// Evenly spaced risks from the minimum-variance risk to the largest
  /// single-asset risk.
  RiskGrid { points: usize },
  /// Target returns `start, start + step, ...` up to `end + extension`,
  /// stopping at the first fully concentrated portfolio.
  Return {
    start: f64,
    end: f64,
    step: f64,
    extension: f64,
  },
}

impl Default for Sweep {
  fn default() -> Self {
    Self::RiskGrid { points: 25 }
  }
}

impl Sweep {
  pub fn default_return() -> Self {
    Self::Return {
      start: 0.005,
      end: 0.03,
      step: 0.001,
      extension: 0.1,
    }
  }

  /// Return sweep built from `self` (or the default return sweep when `self`
  /// is a risk sweep) with the given fields replaced.
  pub fn return_with(
    &self,
    start: Option<f64>,
    end: Option<f64>,
    step: Option<f64>,
    extension: Option<f64>,
  ) -> Self {
    let base = match self {
      Self::Return { .. } => self.clone(),
      _ => Self::default_return(),
    };
    match base {
      Self::Return {
        start: s,
        end: e,
        step: st,
        extension: ext,
      } => Self::Return {
        start: start.unwrap_or(s),
        end: end.unwrap_or(e),
        step: step.unwrap_or(st),
        extension: extension.unwrap_or(ext),
      },
      other => other,
    }
  }

  pub fn validate(&self) -> Result<()> {
    match self {
      Self::Risk { levels } => {
        if levels.is_empty() {
          return Err(FrontierError::InvalidInput("no risk levels given".into()));
        }
        if levels.iter().any(|l| !l.is_finite() || *l < 0.0) {
          return Err(FrontierError::InvalidInput(
            "risk levels must be finite and non-negative".into(),
          ));
        }
        if levels.windows(2).any(|w| w[1] <= w[0]) {
          return Err(FrontierError::InvalidInput(
            "risk levels must be strictly increasing".into(),
          ));
        }
        if levels.len() > MAX_SWEEP_LEVELS {
          return Err(FrontierError::InvalidInput(format!(
            "{} risk levels exceed the limit of {MAX_SWEEP_LEVELS}",
            levels.len()
          )));
        }
      }
      Self::RiskGrid { points } => {
        if *points < 2 {
          return Err(FrontierError::InvalidInput(format!(
            "a risk grid needs at least 2 points, got {points}"
          )));
        }
        if *points > MAX_SWEEP_LEVELS {
          return Err(FrontierError::InvalidInput(format!(
            "a risk grid of {points} points exceeds the limit of {MAX_SWEEP_LEVELS}"
          )));
        }
      }
      Self::Return {
        start,
        end,
        step,
        extension,
      } => {
        if ![*start, *end, *step, *extension].iter().all(|v| v.is_finite()) {
          return Err(FrontierError::InvalidInput(
            "return sweep bounds must be finite".into(),
          ));
        }
        if *step <= 0.0 {
          return Err(FrontierError::InvalidInput("return step must be positive".into()));
        }
        if start > end {
          return Err(FrontierError::InvalidInput(format!(
            "return sweep start {start} is above end {end}"
          )));
        }
        if *extension < 0.0 {
          return Err(FrontierError::InvalidInput(
            "return sweep extension must be non-negative".into(),
          ));
        }
        let span = return_level_span(*start, *end, *step, *extension);
        if !span.is_finite() || span >= MAX_SWEEP_LEVELS as f64 {
          return Err(FrontierError::InvalidInput(format!(
            "return step {step} gives more than {MAX_SWEEP_LEVELS} levels"
          )));
        }
      }
    }
    Ok(())
  }
}

fn validate_constraints(constraints: &Constraints) -> Result<()> {
  if constraints.max_assets == Some(0) {
    return Err(FrontierError::InvalidInput(
      "max_assets must be at least 1".into(),
    ));
  }
  Ok(())
}

/// One significant holding within `0.01` of the whole budget.
pub(crate) fn is_concentrated(weights: &[f64]) -> bool {
  let mut significant = weights.iter().filter(|w| w.abs() >= 0.01);
  match (significant.next(), significant.next()) {
    (Some(w), None) => (w - 1.0).abs() < 0.01,
    _ => false,
  }
}

fn same_weights(a: &[f64], b: &[f64]) -> bool {
  a.len() == b.len()
    && a
      .iter()
      .zip(b.iter())
      .all(|(x, y)| (x - y).abs() <= SAME_WEIGHTS_TOL)
}

/// Sort by risk and drop dominated or repeated points.
pub(crate) fn efficient_branch(mut points: Vec<FrontierPoint>) -> Vec<FrontierPoint> {
  points.sort_by(|a, b| {
    a.risk
      .partial_cmp(&b.risk)
      .unwrap_or(Ordering::Equal)
      .then(
        b.expected_return
          .partial_cmp(&a.expected_return)
          .unwrap_or(Ordering::Equal),
      )
  });

  let mut kept: Vec<FrontierPoint> = Vec::with_capacity(points.len());
  let mut best = f64::NEG_INFINITY;
  for p in points {
    if p.expected_return < best - DOMINANCE_TOL {
      debug!(
        level = p.level,
        risk = p.risk,
        expected_return = p.expected_return,
        "dropping dominated point"
      );
      continue;
    }
    if kept
      .last()
      .is_some_and(|last| same_weights(&last.weights, &p.weights))
    {
      debug!(level = p.level, "collapsing repeated point");
      continue;
    }
    best = best.max(p.expected_return);
    kept.push(p);
  }
  kept
}

fn progress_bar(len: usize, show: bool) -> ProgressBar {
  if !show {
    return ProgressBar::hidden();
  }
  let pb = ProgressBar::new(len as u64);
  if let Ok(style) = ProgressStyle::default_bar()
    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} levels ({eta})")
  {
    pb.set_style(style.progress_chars("#>-"));
  }
  pb
}

/// Traces frontiers with one backend under one set of constraints.
pub struct FrontierSolver<'a> {
  backend: &'a dyn SolverBackend,
  constraints: Constraints,
  risk_free: f64,
  show_progress: bool,
}

impl<'a> FrontierSolver<'a> {
  pub fn new(backend: &'a dyn SolverBackend, constraints: Constraints, risk_free: f64) -> Self {
    Self {
      backend,
      constraints,
      risk_free,
      show_progress: false,
    }
  }

  pub fn with_progress(mut self, show: bool) -> Self {
    self.show_progress = show;
    self
  }

  fn point(&self, problem: &LevelProblem, weights: Vec<f64>) -> FrontierPoint {
    let mean = problem.mean.to_vec();
    let expected_return = dot(&weights, &mean);
    let risk = portfolio_risk(&problem.covariance, &weights);
    FrontierPoint {
      level: problem.level(),
      expected_return,
      risk,
      sharpe: sharpe(expected_return, risk, self.risk_free),
      weights,
    }
  }

  fn solve_clean(&self, problem: &LevelProblem) -> Result<Vec<f64>> {
    let raw = self.backend.solve(problem)?;
    clean_weights(&raw, problem.allow_short)
      .ok_or_else(|| problem.infeasible("weights violate the budget or no-short constraint"))
  }

  /// Solve one level on `base` moments, re-solving on the largest holdings
  /// when the cap is exceeded.
  pub fn solve_level(&self, base: &LevelProblem, objective: Objective) -> Result<FrontierPoint> {
    validate_constraints(&self.constraints)?;
    let problem = base.with_objective(objective);
    let mut weights = self.solve_clean(&problem)?;

    if let Some(cap) = self.constraints.max_assets {
      let held = weights
        .iter()
        .filter(|w| w.abs() > HOLDING_THRESHOLD)
        .count();
      if held > cap {
        let keep = top_k(&weights, cap);
        debug!(level = problem.level(), held, cap, "re-solving on largest holdings");
        let sub = self.solve_clean(&problem.restricted(&keep))?;
        weights = vec![0.0; problem.n_assets()];
        for (&i, w) in keep.iter().zip(sub) {
          weights[i] = w;
        }
      }
    }

    Ok(self.point(&problem, weights))
  }

  fn risk_grid(
    &self,
    base: &LevelProblem,
    moments: &MomentsEstimate,
    points: usize,
  ) -> Result<(FrontierPoint, Vec<f64>)> {
    let mut mv = self.solve_level(base, Objective::MinVariance)?;
    // the grid starts at the minimum-variance risk
    mv.level = mv.risk;
    let lower = mv.risk;
    let upper = moments.volatilities().iter().fold(0.0f64, |m, v| m.max(*v));
    if upper <= lower {
      return Ok((mv, Vec::new()));
    }
    let levels = (1..points)
      .map(|i| lower + (upper - lower) * i as f64 / (points - 1) as f64)
      .collect();
    Ok((mv, levels))
  }

  /// Run `sweep` and return the efficient branch plus skipped levels.
  pub fn trace(&self, moments: &MomentsEstimate, sweep: &Sweep) -> Result<Frontier> {
    sweep.validate()?;
    validate_constraints(&self.constraints)?;
    let base = LevelProblem::from_moments(
      moments,
      Objective::MinVariance,
      self.constraints.allow_short,
    );

    let mut points = Vec::new();
    let objectives: Vec<Objective> = match sweep {
      Sweep::Risk { levels } => levels
        .iter()
        .map(|&l| Objective::MaxReturnWithRisk(l))
        .collect(),
      Sweep::RiskGrid { points: n } => {
        // the lowest grid level is the minimum-variance point itself
        let (mv, levels) = self.risk_grid(&base, moments, *n)?;
        points.push(mv);
        levels.into_iter().map(Objective::MaxReturnWithRisk).collect()
      }
      Sweep::Return {
        start,
        end,
        step,
        extension,
      } => {
        let count = return_level_span(*start, *end, *step, *extension) as usize + 1;
        (0..count)
          .map(|k| Objective::MinVarianceWithReturn(start + k as f64 * step))
          .collect()
      }
    };
    let stop_on_concentration = matches!(sweep, Sweep::Return { .. });

    info!(
      backend = self.backend.name(),
      levels = objectives.len(),
      allow_short = self.constraints.allow_short,
      max_assets = ?self.constraints.max_assets,
      "tracing efficient frontier"
    );

    let pb = progress_bar(objectives.len(), self.show_progress);
    let mut failures = Vec::new();
    for objective in objectives {
      match self.solve_level(&base, objective) {
        Ok(point) => {
          let stop = stop_on_concentration && is_concentrated(&point.weights);
          points.push(point);
          if stop {
            debug!(level = objective.level(), "reached full concentration");
            break;
          }
        }
        Err(e) if e.is_recoverable() => {
          warn!(level = objective.level(), error = %e, "skipping sweep level");
          failures.push(SweepFailure {
            level: objective.level(),
            reason: e.to_string(),
          });
        }
        Err(e) => {
          pb.abandon();
          return Err(e);
        }
      }
      pb.inc(1);
    }
    pb.finish_and_clear();

    let solved = points.len();
    let points = efficient_branch(points);
    info!(
      solved,
      kept = points.len(),
      skipped = failures.len(),
      "frontier traced"
    );
    Ok(Frontier { points, failures })
  }
}

/// Global minimum-variance portfolio under `constraints`.
pub fn min_variance_portfolio(
  moments: &MomentsEstimate,
  backend: &dyn SolverBackend,
  constraints: &Constraints,
) -> Result<FrontierPoint> {
  let base = LevelProblem::from_moments(moments, Objective::MinVariance, constraints.allow_short);
  FrontierSolver::new(backend, *constraints, 0.0).solve_level(&base, Objective::MinVariance)
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;
  use std::sync::atomic::Ordering as AtomicOrdering;

  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use ndarray::Array1;
  use ndarray::Array2;

  use super::*;
  use crate::market::Ticker;
  use crate::portfolio::optimizers::ClarabelBackend;

  fn moments(mean: Array1<f64>, cov: Array2<f64>) -> MomentsEstimate {
    let tickers = (0..mean.len())
      .map(|i| Ticker::new(&format!("A{i}")).unwrap())
      .collect();
    MomentsEstimate::from_parts(tickers, mean, cov, 24).unwrap()
  }

  fn four_assets() -> MomentsEstimate {
    moments(
      array![0.006, 0.009, 0.012, 0.015],
      array![
        [0.0016, 0.0004, 0.0002, 0.0001],
        [0.0004, 0.0036, 0.0006, 0.0003],
        [0.0002, 0.0006, 0.0064, 0.0008],
        [0.0001, 0.0003, 0.0008, 0.0100]
      ],
    )
  }

  fn point(risk: f64, expected_return: f64, weights: Vec<f64>) -> FrontierPoint {
    FrontierPoint {
      level: risk,
      weights,
      expected_return,
      risk,
      sharpe: 0.0,
    }
  }

  #[test]
  fn sweep_validation() {
    assert!(Sweep::Risk { levels: vec![0.1, 0.1] }.validate().is_err());
    assert!(Sweep::Risk { levels: vec![0.1, f64::NAN] }.validate().is_err());
    assert!(Sweep::RiskGrid { points: 1 }.validate().is_err());
    assert!(Sweep::Return { start: 0.1, end: 0.0, step: 0.01, extension: 0.0 }
      .validate()
      .is_err());
    assert!(Sweep::Return { start: 0.0, end: 0.1, step: 0.0, extension: 0.0 }
      .validate()
      .is_err());
    assert!(Sweep::default().validate().is_ok());
    assert!(Sweep::default_return().validate().is_ok());
  }

  #[test]
  fn oversized_sweeps_are_rejected_before_allocation() {
    let tiny_step = Sweep::Return { start: 0.0, end: 0.03, step: 1e-15, extension: 0.1 };
    assert!(matches!(tiny_step.validate(), Err(FrontierError::InvalidInput(_))));
    let subnormal_step = Sweep::Return { start: 0.0, end: 0.03, step: 1e-320, extension: 0.1 };
    assert!(matches!(subnormal_step.validate(), Err(FrontierError::InvalidInput(_))));
    let wide_grid = Sweep::RiskGrid { points: MAX_SWEEP_LEVELS + 1 };
    assert!(matches!(wide_grid.validate(), Err(FrontierError::InvalidInput(_))));

    let m = four_assets();
    let backend = ClarabelBackend::default();
    let err = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &tiny_step)
      .unwrap_err();
    assert!(matches!(err, FrontierError::InvalidInput(_)));
  }

  #[test]
  fn return_overrides_keep_unset_fields() {
    let sweep = Sweep::default().return_with(Some(0.01), None, Some(0.002), None);
    assert_eq!(
      sweep,
      Sweep::Return {
        start: 0.01,
        end: 0.03,
        step: 0.002,
        extension: 0.1
      }
    );
    let again = sweep.return_with(None, Some(0.05), None, None);
    assert!(matches!(again, Sweep::Return { start, end, .. } if start == 0.01 && end == 0.05));
  }

  #[test]
  fn concentration_detection() {
    assert!(is_concentrated(&[0.0, 0.995, 0.005]));
    assert!(!is_concentrated(&[0.0, 0.98, 0.02]));
    assert!(!is_concentrated(&[0.5, 0.5]));
  }

  #[test]
  fn efficient_branch_sorts_and_prunes() {
    let points = vec![
      point(0.20, 0.10, vec![0.0, 1.0]),
      point(0.10, 0.05, vec![1.0, 0.0]),
      point(0.15, 0.04, vec![0.7, 0.3]),
      point(0.10, 0.05, vec![1.0, 0.0]),
    ];
    let kept = efficient_branch(points);
    let risks: Vec<f64> = kept.iter().map(|p| p.risk).collect();
    assert_eq!(risks, vec![0.10, 0.20]);
  }

  #[test]
  fn risk_grid_frontier_is_efficient() {
    let m = four_assets();
    let backend = ClarabelBackend::default();
    let frontier = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &Sweep::RiskGrid { points: 12 })
      .unwrap();

    assert!(frontier.len() >= 2);
    assert!(frontier.failures.is_empty());
    for p in &frontier.points {
      assert_abs_diff_eq!(p.weight_sum(), 1.0, epsilon = 1e-8);
      assert!(p.weights.iter().all(|&w| w >= 0.0));
    }
    for pair in frontier.points.windows(2) {
      assert!(pair[1].risk >= pair[0].risk);
      assert!(pair[1].expected_return >= pair[0].expected_return - 1e-8);
    }
  }

  #[test]
  fn risk_grid_starts_at_minimum_variance_risk() {
    let m = four_assets();
    let backend = ClarabelBackend::default();
    let frontier = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &Sweep::RiskGrid { points: 6 })
      .unwrap();

    let first = &frontier.points[0];
    assert!(first.level > 0.0);
    assert_abs_diff_eq!(first.level, first.risk, epsilon = 1e-12);
  }

  /// Succeeds once with equal weights, then reports itself unavailable.
  struct FailingAfterFirst {
    calls: AtomicUsize,
  }

  impl SolverBackend for FailingAfterFirst {
    fn name(&self) -> &'static str {
      "failing-after-first"
    }

    fn solve(&self, problem: &LevelProblem) -> Result<Vec<f64>> {
      if self.calls.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
        let n = problem.n_assets();
        Ok(vec![1.0 / n as f64; n])
      } else {
        Err(FrontierError::unavailable(self.name(), "backend went away"))
      }
    }
  }

  #[test]
  fn unavailable_backend_aborts_the_sweep() {
    let m = four_assets();
    let backend = FailingAfterFirst {
      calls: AtomicUsize::new(0),
    };
    let err = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &Sweep::Risk { levels: vec![0.1, 0.2, 0.3] })
      .unwrap_err();

    assert!(matches!(
      err,
      FrontierError::SolverUnavailable { backend: "failing-after-first", .. }
    ));
    // the third level is never attempted
    assert_eq!(backend.calls.load(AtomicOrdering::SeqCst), 2);
  }

  #[test]
  fn risk_levels_below_minimum_are_skipped() {
    let m = four_assets();
    let backend = ClarabelBackend::default();
    let frontier = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &Sweep::Risk { levels: vec![0.001, 0.05, 0.08] })
      .unwrap();

    assert_eq!(frontier.failures.len(), 1);
    assert_eq!(frontier.failures[0].level, 0.001);
    assert_eq!(frontier.len(), 2);
  }

  #[test]
  fn holding_cap_is_respected() {
    let m = four_assets();
    let backend = ClarabelBackend::default();
    let constraints = Constraints {
      allow_short: false,
      max_assets: Some(2),
    };
    let frontier = FrontierSolver::new(&backend, constraints, 0.0)
      .trace(&m, &Sweep::RiskGrid { points: 8 })
      .unwrap();

    assert!(!frontier.is_empty());
    for p in &frontier.points {
      assert!(p.holdings() <= 2, "{:?}", p.weights);
      assert_abs_diff_eq!(p.weight_sum(), 1.0, epsilon = 1e-8);
    }
  }

  #[test]
  fn return_sweep_stops_at_full_concentration() {
    let m = moments(
      array![0.01, 0.02, 0.1003],
      array![[0.001, 0.0001, 0.0], [0.0001, 0.002, 0.0002], [0.0, 0.0002, 0.01]],
    );
    let backend = ClarabelBackend::default();
    let frontier = FrontierSolver::new(&backend, Constraints::default(), 0.0)
      .trace(&m, &Sweep::default_return())
      .unwrap();

    // every level up to the stop is feasible, later ones would not be
    assert!(frontier.failures.is_empty());
    let last = frontier.points.last().unwrap();
    assert!(is_concentrated(&last.weights));
    assert!(last.level <= 0.1 + 1e-12);
  }

  #[test]
  fn zero_holding_cap_is_rejected() {
    let m = four_assets();
    let backend = ClarabelBackend::default();
    let constraints = Constraints {
      allow_short: false,
      max_assets: Some(0),
    };
    let err = min_variance_portfolio(&m, &backend, &constraints).unwrap_err();
    assert!(matches!(err, FrontierError::InvalidInput(_)));
  }
}
