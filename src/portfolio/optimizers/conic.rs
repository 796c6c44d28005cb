//! # Conic Backend
//!
//! $$
//! \min_x \tfrac12 x^\top P x + q^\top x\quad\text{s.t.}\quad Ax + s = b,\ s\in\mathcal K
//! $$
//!
//! Sweep levels as Clarabel QPs (return target) or SOCPs (risk target).
//! Rows are ordered budget equality, nonnegative block, then the risk cone.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use clarabel::solver::SupportedConeT::NonnegativeConeT;
use clarabel::solver::SupportedConeT::SecondOrderConeT;
use clarabel::solver::SupportedConeT::ZeroConeT;
use impl_new_derive::ImplNew;
use tracing::trace;

use super::LevelProblem;
use super::Objective;
use super::SolverBackend;
use crate::error::FrontierError;
use crate::error::Result;
use crate::portfolio::data::psd_projection;
use crate::portfolio::data::risk_factor;

const NAME: &str = "clarabel";

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct ClarabelBackend {
  pub max_iter: u32,
  pub tolerance: f64,
}

impl Default for ClarabelBackend {
  fn default() -> Self {
    Self {
      max_iter: 200,
      tolerance: 1e-9,
    }
  }
}

fn dense_to_csc<F>(rows: usize, cols: usize, entry: F) -> CscMatrix<f64>
where
  F: Fn(usize, usize) -> f64,
{
  let mut colptr = Vec::with_capacity(cols + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();
  colptr.push(0);
  for j in 0..cols {
    for i in 0..rows {
      let v = entry(i, j);
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(rowval.len());
  }
  CscMatrix::new(rows, cols, colptr, rowval, nzval)
}

struct ConicForm {
  p: CscMatrix<f64>,
  q: Vec<f64>,
  a_rows: Vec<Vec<f64>>,
  b: Vec<f64>,
  cones: Vec<SupportedConeT<f64>>,
}

fn cone_dim(cone: &SupportedConeT<f64>) -> usize {
  match cone {
    ZeroConeT(d) | NonnegativeConeT(d) | SecondOrderConeT(d) => *d,
    _ => 0,
  }
}

impl ConicForm {
  /// Shape check ahead of `DefaultSolver::new`, which asserts instead of
  /// returning an error.
  fn check_dims(&self, n: usize) -> Result<()> {
    let m = self.b.len();
    let cone_rows: usize = self.cones.iter().map(cone_dim).sum();
    if self.p.m != n || self.p.n != n {
      return Err(FrontierError::unavailable(
        NAME,
        format!("P is {}x{}, expected {n}x{n}", self.p.m, self.p.n),
      ));
    }
    if self.q.len() != n {
      return Err(FrontierError::unavailable(
        NAME,
        format!("q has {} entries, expected {n}", self.q.len()),
      ));
    }
    if self.a_rows.len() != m || self.a_rows.iter().any(|r| r.len() != n) {
      return Err(FrontierError::unavailable(
        NAME,
        format!("A does not match {m} constraint rows of width {n}"),
      ));
    }
    if cone_rows != m {
      return Err(FrontierError::unavailable(
        NAME,
        format!("cones cover {cone_rows} rows, b has {m}"),
      ));
    }
    Ok(())
  }
}

fn build_form(problem: &LevelProblem) -> Result<ConicForm> {
  let n = problem.n_assets();
  let mut a_rows = vec![vec![1.0; n]];
  let mut b = vec![1.0];
  let mut cones = vec![ZeroConeT(1)];
  let mut nonneg = 0;

  if let Objective::MinVarianceWithReturn(target) = problem.objective {
    a_rows.push(problem.mean.iter().map(|m| -m).collect());
    b.push(-target);
    nonneg += 1;
  }
  if !problem.allow_short {
    for i in 0..n {
      let mut row = vec![0.0; n];
      row[i] = -1.0;
      a_rows.push(row);
      b.push(0.0);
    }
    nonneg += n;
  }
  if nonneg > 0 {
    cones.push(NonnegativeConeT(nonneg));
  }

  let (p, q) = match problem.objective {
    Objective::MaxReturnWithRisk(sigma) => {
      if sigma.is_nan() || sigma < 0.0 {
        return Err(problem.infeasible("risk level must be non-negative"));
      }
      let g = risk_factor(&problem.covariance);
      a_rows.push(vec![0.0; n]);
      b.push(sigma);
      for k in 0..n {
        a_rows.push((0..n).map(|j| -g[(k, j)]).collect());
        b.push(0.0);
      }
      cones.push(SecondOrderConeT(n + 1));
      (
        CscMatrix::new(n, n, vec![0; n + 1], Vec::new(), Vec::new()),
        problem.mean.iter().map(|m| -m).collect(),
      )
    }
    Objective::MinVariance | Objective::MinVarianceWithReturn(_) => {
      let cov = psd_projection(&problem.covariance);
      // upper triangle only
      let p = dense_to_csc(n, n, |i, j| if i <= j { 2.0 * cov[[i, j]] } else { 0.0 });
      (p, vec![0.0; n])
    }
  };

  Ok(ConicForm {
    p,
    q,
    a_rows,
    b,
    cones,
  })
}

impl SolverBackend for ClarabelBackend {
  fn name(&self) -> &'static str {
    NAME
  }

  fn solve(&self, problem: &LevelProblem) -> Result<Vec<f64>> {
    let n = problem.n_assets();
    if n == 0 {
      return Err(FrontierError::InvalidInput("empty problem".into()));
    }

    let form = build_form(problem)?;
    form.check_dims(n)?;
    let a = dense_to_csc(form.a_rows.len(), n, |i, j| form.a_rows[i][j]);

    let settings = DefaultSettingsBuilder::default()
      .verbose(false)
      .max_iter(self.max_iter)
      .tol_gap_abs(self.tolerance)
      .tol_gap_rel(self.tolerance)
      .tol_feas(self.tolerance)
      .build()
      .map_err(|e| FrontierError::unavailable(NAME, format!("invalid settings: {e}")))?;

    let mut solver = DefaultSolver::new(&form.p, &form.q, &a, &form.b, &form.cones, settings);
    solver.solve();

    let status = solver.solution.status;
    trace!(level = problem.level(), ?status, "clarabel finished");
    match status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => Ok(solver.solution.x.clone()),
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
        Err(problem.infeasible("no portfolio satisfies the constraints"))
      }
      other => Err(problem.infeasible(format!("solver stopped with status {other:?}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::portfolio::data::dot;
  use crate::portfolio::data::portfolio_risk;

  fn problem(objective: Objective, allow_short: bool) -> LevelProblem {
    LevelProblem::new(
      array![0.05, 0.10],
      array![[0.04, 0.0], [0.0, 0.09]],
      objective,
      allow_short,
    )
  }

  #[test]
  fn min_variance_of_uncorrelated_pair() {
    let w = ClarabelBackend::default()
      .solve(&problem(Objective::MinVariance, false))
      .unwrap();
    assert_abs_diff_eq!(w[0], 0.09 / 0.13, epsilon = 1e-6);
    assert_abs_diff_eq!(w[1], 0.04 / 0.13, epsilon = 1e-6);
  }

  #[test]
  fn return_target_binds() {
    let p = problem(Objective::MinVarianceWithReturn(0.08), false);
    let w = ClarabelBackend::default().solve(&p).unwrap();
    assert_abs_diff_eq!(dot(&w, p.mean.as_slice().unwrap()), 0.08, epsilon = 1e-6);
    assert_abs_diff_eq!(w[0] + w[1], 1.0, epsilon = 1e-7);
  }

  #[test]
  fn risk_target_is_respected() {
    let p = problem(Objective::MaxReturnWithRisk(0.25), false);
    let w = ClarabelBackend::default().solve(&p).unwrap();
    assert!(portfolio_risk(&p.covariance, &w) <= 0.25 + 1e-6);
    assert!(w.iter().all(|&v| v > -1e-7));

    // above every asset's volatility the best long-only answer is the top asset
    let p = problem(Objective::MaxReturnWithRisk(0.5), false);
    let w = ClarabelBackend::default().solve(&p).unwrap();
    assert_abs_diff_eq!(w[1], 1.0, epsilon = 1e-5);
  }

  #[test]
  fn built_forms_are_consistent_and_mismatches_are_unavailable() {
    for objective in [
      Objective::MinVariance,
      Objective::MinVarianceWithReturn(0.08),
      Objective::MaxReturnWithRisk(0.25),
    ] {
      for allow_short in [false, true] {
        build_form(&problem(objective, allow_short))
          .unwrap()
          .check_dims(2)
          .unwrap();
      }
    }

    let mut form = build_form(&problem(Objective::MinVariance, false)).unwrap();
    form.b.push(0.0);
    let err = form.check_dims(2).unwrap_err();
    assert!(matches!(err, FrontierError::SolverUnavailable { backend: "clarabel", .. }));
    assert!(form.check_dims(3).is_err());
  }

  #[test]
  fn risk_below_minimum_is_infeasible() {
    let err = ClarabelBackend::default()
      .solve(&problem(Objective::MaxReturnWithRisk(0.1), false))
      .unwrap_err();
    assert!(matches!(err, FrontierError::SolverInfeasible { .. }));
  }

  #[test]
  fn unreachable_return_is_infeasible_long_only() {
    let err = ClarabelBackend::default()
      .solve(&problem(Objective::MinVarianceWithReturn(0.2), false))
      .unwrap_err();
    assert!(err.is_recoverable());

    let w = ClarabelBackend::default()
      .solve(&problem(Objective::MinVarianceWithReturn(0.2), true))
      .unwrap();
    assert!(w[0] < 0.0);
  }
}
