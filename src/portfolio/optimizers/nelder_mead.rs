//! # Nelder-Mead Backend
//!
//! $$
//! \min_{x}\ \frac{\mathbf{w}(x)^\top\Sigma\mathbf{w}(x)}{s_\sigma^2} + \lambda\left(\frac{(r-\mu^\top\mathbf{w}(x))_+}{s_\mu}\right)^2
//! $$
//!
//! Derivative-free penalty search. Long-only weights are a softmax of the
//! free parameters, long-short weights put the budget slack on the last asset.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use ndarray::Array2;

use super::LevelProblem;
use super::Objective;
use super::SolverBackend;
use crate::error::FrontierError;
use crate::error::Result;
use crate::portfolio::data::dot;
use crate::portfolio::data::portfolio_variance;

const NAME: &str = "nelder-mead";

/// Relative slack accepted on a penalised constraint.
const FEASIBILITY_TOL: f64 = 1e-3;

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct NelderMeadBackend {
  pub max_iters: u64,
  pub penalty: f64,
  pub sd_tolerance: f64,
}

impl Default for NelderMeadBackend {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      penalty: 1e4,
      sd_tolerance: 1e-12,
    }
  }
}

#[derive(Clone, Copy, Debug)]
enum Parametrization {
  Softmax,
  Budget,
}

impl Parametrization {
  fn weights(&self, x: &[f64]) -> Vec<f64> {
    match self {
      Self::Softmax => softmax(x),
      Self::Budget => {
        let mut w = x.to_vec();
        w.push(1.0 - x.iter().sum::<f64>());
        w
      }
    }
  }

  fn simplex(&self, n: usize) -> Vec<Vec<f64>> {
    let (x0, step) = match self {
      Self::Softmax => (vec![0.0; n], 1.0),
      Self::Budget => (vec![1.0 / n as f64; n - 1], 0.5),
    };
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.clone());
    for i in 0..x0.len() {
      let mut point = x0.clone();
      point[i] += step;
      simplex.push(point);
    }
    simplex
  }
}

fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

#[derive(Clone)]
struct LevelCost {
  mean: Vec<f64>,
  cov: Array2<f64>,
  objective: Objective,
  parametrization: Parametrization,
  penalty: f64,
  var_scale: f64,
  ret_scale: f64,
}

impl LevelCost {
  fn new(problem: &LevelProblem, parametrization: Parametrization, penalty: f64) -> Self {
    let var_scale = problem
      .covariance
      .diag()
      .iter()
      .fold(0.0f64, |m, v| m.max(*v))
      .max(1e-300);
    let ret_scale = problem
      .mean
      .iter()
      .fold(0.0f64, |m, v| m.max(v.abs()))
      .max(1e-12);
    Self {
      mean: problem.mean.to_vec(),
      cov: problem.covariance.clone(),
      objective: problem.objective,
      parametrization,
      penalty,
      var_scale,
      ret_scale,
    }
  }

  fn risk_scale(&self) -> f64 {
    self.var_scale.sqrt()
  }

  fn evaluate(&self, w: &[f64]) -> f64 {
    let var = portfolio_variance(&self.cov, w);
    let ret = dot(w, &self.mean);
    match self.objective {
      Objective::MinVariance => var / self.var_scale,
      Objective::MinVarianceWithReturn(target) => {
        let shortfall = (target - ret).max(0.0) / self.ret_scale;
        var / self.var_scale + self.penalty * shortfall.powi(2)
      }
      Objective::MaxReturnWithRisk(sigma) => {
        let excess = (var.max(0.0).sqrt() - sigma).max(0.0) / self.risk_scale();
        -ret / self.ret_scale + self.penalty * excess.powi(2)
      }
    }
  }

  fn check(&self, w: &[f64], problem: &LevelProblem) -> Result<()> {
    match self.objective {
      Objective::MinVariance => Ok(()),
      Objective::MinVarianceWithReturn(target) => {
        let ret = dot(w, &self.mean);
        if ret < target - FEASIBILITY_TOL * self.ret_scale {
          Err(problem.infeasible(format!("best return {ret:.6} stays below target")))
        } else {
          Ok(())
        }
      }
      Objective::MaxReturnWithRisk(sigma) => {
        let risk = portfolio_variance(&self.cov, w).max(0.0).sqrt();
        if risk > sigma + FEASIBILITY_TOL * self.risk_scale() {
          Err(problem.infeasible(format!("lowest reachable risk {risk:.6} exceeds level")))
        } else {
          Ok(())
        }
      }
    }
  }
}

impl CostFunction for LevelCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(self.evaluate(&self.parametrization.weights(x)))
  }
}

impl SolverBackend for NelderMeadBackend {
  fn name(&self) -> &'static str {
    NAME
  }

  fn solve(&self, problem: &LevelProblem) -> Result<Vec<f64>> {
    let n = problem.n_assets();
    if n == 0 {
      return Err(FrontierError::InvalidInput("empty problem".into()));
    }

    let parametrization = if problem.allow_short {
      Parametrization::Budget
    } else {
      Parametrization::Softmax
    };
    let cost = LevelCost::new(problem, parametrization, self.penalty);

    if n == 1 {
      let w = vec![1.0];
      cost.check(&w, problem)?;
      return Ok(w);
    }

    let simplex = parametrization.simplex(n);
    let x0 = simplex[0].clone();
    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(self.sd_tolerance)
      .map_err(|e| FrontierError::unavailable(NAME, e.to_string()))?;

    let res = Executor::new(cost.clone(), solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run()
      .map_err(|e| FrontierError::unavailable(NAME, e.to_string()))?;

    let best_x = res.state.best_param.unwrap_or(x0);
    let w = parametrization.weights(&best_x);
    cost.check(&w, problem)?;
    Ok(w)
  }
}
