//! # Pipeline
//!
//! $$
//! \text{prices} \to \text{returns} \to (\mu, \Sigma) \to \mathcal F \to \text{portfolios} \to \text{report}
//! $$
//!
//! One end-to-end run driven by a [`PipelineConfig`].

use std::path::PathBuf;

use tracing::info;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::market::fetch_all;
use crate::market::PriceSource;
use crate::market::Ticker;
use crate::moments::estimate_moments;
use crate::moments::MomentsEstimate;
use crate::portfolio::Frontier;
use crate::portfolio::PortfolioEngine;
use crate::portfolio::SelectedPortfolios;
use crate::report;
use crate::report::ReportInput;
use crate::returns::ReturnSet;

/// Fewer tickers than this give a thin frontier.
pub const RECOMMENDED_MIN_TICKERS: usize = 5;

/// Everything computed by one run.
#[derive(Clone, Debug)]
pub struct RunOutput {
  pub returns: ReturnSet,
  pub moments: MomentsEstimate,
  pub frontier: Frontier,
  pub portfolios: SelectedPortfolios,
  /// Requested tickers dropped for lack of data.
  pub skipped: Vec<Ticker>,
}

impl RunOutput {
  pub fn report_input(&self) -> ReportInput<'_> {
    ReportInput {
      returns_daily: &self.returns.daily,
      returns_log: &self.returns.log,
      returns_monthly: &self.returns.monthly,
      tickers: self.moments.tickers(),
      covariance: self.moments.covariance(),
      correlation: self.moments.correlation(),
      frontier: &self.frontier,
      portfolios: &self.portfolios,
    }
  }
}

/// Run with the source named in `config`.
pub fn run(config: &PipelineConfig) -> Result<RunOutput> {
  let source = config.source.build()?;
  run_with_source(config, source.as_ref())
}

/// Run against an explicit price source.
pub fn run_with_source<S: PriceSource + ?Sized>(
  config: &PipelineConfig,
  source: &S,
) -> Result<RunOutput> {
  let tickers = config.unique_tickers()?;
  let range = config.range()?;
  let engine = PortfolioEngine::new(config.engine.clone());
  engine.validate()?;

  if tickers.len() < RECOMMENDED_MIN_TICKERS {
    warn!(
      count = tickers.len(),
      "fewer than {RECOMMENDED_MIN_TICKERS} tickers; a wider universe gives a more useful frontier"
    );
  }
  info!(
    source = source.name(),
    tickers = tickers.len(),
    start = %range.start,
    end = %range.end,
    "fetching prices"
  );

  let fetched = fetch_all(source, &tickers, &range, config.strict_data)?;
  let returns = ReturnSet::build(&fetched.histories)?;

  let mut moments = estimate_moments(returns.for_frequency(config.frequency))?;
  if config.annualize {
    moments = moments.annualized(config.frequency.periods_per_year());
  }
  info!(
    frequency = %config.frequency,
    periods = moments.n_periods(),
    assets = moments.n_assets(),
    "estimated moments"
  );

  let out = engine.run(&moments)?;
  info!(
    points = out.frontier.len(),
    failures = out.frontier.failures.len(),
    "traced efficient frontier"
  );

  Ok(RunOutput {
    returns,
    moments,
    frontier: out.frontier,
    portfolios: out.portfolios,
    skipped: fetched.skipped,
  })
}

/// Run, write every artefact to the output directory and print the summary.
pub fn run_and_report(config: &PipelineConfig) -> Result<(RunOutput, Vec<PathBuf>)> {
  let output = run(config)?;
  let written = report::write_all(&config.output_dir, &output.report_input(), config.write_plots)?;
  report::summary_table(&output.portfolios).printstd();
  Ok((output, written))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use tracing_test::traced_test;

  use super::*;
  use crate::error::FrontierError;
  use crate::market::SyntheticPriceSource;

  fn config(tickers: &[&str]) -> PipelineConfig {
    PipelineConfig {
      tickers: tickers.iter().map(|t| Ticker::new(t).unwrap()).collect(),
      start: NaiveDate::from_ymd_opt(2021, 1, 1),
      end: NaiveDate::from_ymd_opt(2023, 1, 1),
      ..Default::default()
    }
  }

  #[test]
  #[traced_test]
  fn small_universe_warns_and_still_runs() {
    let out = run_with_source(
      &config(&["AAPL", "MSFT", "NVDA"]),
      &SyntheticPriceSource::default(),
    )
    .unwrap();

    assert!(logs_contain("fewer than 5 tickers"));
    assert!(out.skipped.is_empty());
    assert_eq!(out.moments.n_assets(), 3);
    assert!(!out.frontier.is_empty());
    for p in out.portfolios.iter() {
      assert_abs_diff_eq!(p.point.weight_sum(), 1.0, epsilon = 1e-6);
    }
  }

  #[test]
  fn annualize_scales_moments() {
    let plain = run_with_source(&config(&["AAPL", "MSFT"]), &SyntheticPriceSource::default())
      .unwrap();
    let yearly = run_with_source(
      &PipelineConfig {
        annualize: true,
        ..config(&["AAPL", "MSFT"])
      },
      &SyntheticPriceSource::default(),
    )
    .unwrap();

    assert_abs_diff_eq!(
      yearly.moments.mean()[0],
      12.0 * plain.moments.mean()[0],
      epsilon = 1e-12
    );
  }

  #[test]
  fn missing_range_is_invalid_input() {
    let cfg = PipelineConfig {
      end: None,
      ..config(&["AAPL"])
    };
    let err = run_with_source(&cfg, &SyntheticPriceSource::default()).unwrap_err();
    assert!(matches!(err, FrontierError::InvalidInput(_)));
  }
}
