use approx::assert_abs_diff_eq;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::array;
use ndarray::Array1;
use ndarray::Array2;
use portfolio_frontier::portfolio::optimizers::AnalyticBackend;
use portfolio_frontier::portfolio::optimizers::ClarabelBackend;
use portfolio_frontier::portfolio::optimizers::NelderMeadBackend;
use portfolio_frontier::portfolio::min_variance_portfolio;
use portfolio_frontier::portfolio::Constraints;
use portfolio_frontier::portfolio::FrontierSolver;
use portfolio_frontier::portfolio::SolverBackend;
use portfolio_frontier::portfolio::Sweep;
use portfolio_frontier::MomentsEstimate;
use portfolio_frontier::Ticker;

fn moments(mean: Array1<f64>, cov: Array2<f64>) -> MomentsEstimate {
  let tickers = (0..mean.len())
    .map(|i| Ticker::new(&format!("T{i}")).unwrap())
    .collect();
  MomentsEstimate::from_parts(tickers, mean, cov, 60).unwrap()
}

fn five_assets() -> MomentsEstimate {
  let vols = [0.04, 0.06, 0.08, 0.10, 0.13];
  let mean = array![0.004, 0.007, 0.009, 0.012, 0.016];
  let cov = Array2::from_shape_fn((5, 5), |(i, j)| {
    let rho = if i == j { 1.0 } else { 0.25 };
    rho * vols[i] * vols[j]
  });
  moments(mean, cov)
}

const LONG_ONLY: Constraints = Constraints {
  allow_short: false,
  max_assets: None,
};

const SHORTS: Constraints = Constraints {
  allow_short: true,
  max_assets: None,
};

#[test]
fn long_only_frontier_invariants() {
  let m = five_assets();
  let backend = ClarabelBackend::default();
  let frontier = FrontierSolver::new(&backend, LONG_ONLY, 0.0)
    .trace(&m, &Sweep::RiskGrid { points: 15 })
    .unwrap();

  assert!(frontier.len() > 3);
  for p in &frontier.points {
    assert_abs_diff_eq!(p.weight_sum(), 1.0, epsilon = 1e-6);
    assert!(p.weights.iter().all(|&w| w >= 0.0));
  }
  for pair in frontier.points.windows(2) {
    assert!(pair[1].risk >= pair[0].risk);
    assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
  }
}

#[test]
fn identical_means_give_closed_form_min_variance() {
  let cov = array![
    [0.040, 0.006, 0.002],
    [0.006, 0.025, 0.004],
    [0.002, 0.004, 0.090]
  ];
  let m = moments(array![0.01, 0.01, 0.01], cov.clone());

  let sigma = DMatrix::from_fn(3, 3, |i, j| cov[[i, j]]);
  let inv = sigma.try_inverse().unwrap();
  let raw = &inv * DVector::from_element(3, 1.0);
  let expected = &raw / raw.sum();

  let backends: [&dyn SolverBackend; 2] = [&ClarabelBackend::default(), &AnalyticBackend];
  for backend in backends {
    let p = min_variance_portfolio(&m, backend, &SHORTS).unwrap();
    for i in 0..3 {
      assert_abs_diff_eq!(p.weights[i], expected[i], epsilon = 1e-5);
    }
  }
}

#[test]
fn fully_correlated_pair_with_shorts_reaches_zero_risk() {
  let m = moments(array![0.05, 0.10], array![[0.01, 0.02], [0.02, 0.04]]);
  let p = min_variance_portfolio(&m, &AnalyticBackend, &SHORTS).unwrap();

  assert_abs_diff_eq!(p.weights[0], 2.0, epsilon = 1e-6);
  assert_abs_diff_eq!(p.weights[1], -1.0, epsilon = 1e-6);
  assert_abs_diff_eq!(p.risk, 0.0, epsilon = 1e-6);
}

#[test]
fn fully_correlated_pair_long_only_is_a_line() {
  let m = moments(array![0.05, 0.10], array![[0.01, 0.02], [0.02, 0.04]]);
  let backend = ClarabelBackend::default();
  let frontier = FrontierSolver::new(&backend, LONG_ONLY, 0.0)
    .trace(&m, &Sweep::RiskGrid { points: 8 })
    .unwrap();

  assert!(!frontier.is_empty());
  for p in &frontier.points {
    assert_abs_diff_eq!(p.expected_return, 0.5 * p.risk, epsilon = 1e-6);
  }
  let (lo, hi) = frontier.risk_range().unwrap();
  assert_abs_diff_eq!(lo, 0.1, epsilon = 1e-4);
  assert_abs_diff_eq!(hi, 0.2, epsilon = 1e-4);
}

#[test]
fn nelder_mead_agrees_with_conic_on_min_variance() {
  let m = five_assets();
  let conic = min_variance_portfolio(&m, &ClarabelBackend::default(), &LONG_ONLY).unwrap();
  let nm = min_variance_portfolio(&m, &NelderMeadBackend::default(), &LONG_ONLY).unwrap();

  assert!(nm.risk >= conic.risk - 1e-6);
  assert_abs_diff_eq!(nm.risk, conic.risk, epsilon = 5e-3);
}

#[test]
fn holding_cap_limits_positions() {
  let m = five_assets();
  let backend = ClarabelBackend::default();
  let frontier = FrontierSolver::new(
    &backend,
    Constraints {
      allow_short: false,
      max_assets: Some(2),
    },
    0.0,
  )
  .trace(&m, &Sweep::RiskGrid { points: 10 })
  .unwrap();

  assert!(!frontier.is_empty());
  for p in &frontier.points {
    assert!(p.holdings() <= 2);
    assert_abs_diff_eq!(p.weight_sum(), 1.0, epsilon = 1e-6);
  }
}
