//! # Report
//!
//! $$
//! \text{run} \mapsto \{\texttt{*.csv},\ \texttt{portfolios.json},\ \texttt{*.html}\}
//! $$
//!
//! Output artefacts of a pipeline run and the console summary table.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::path::PathBuf;

use csv::Writer;
use ndarray::Array2;
use prettytable::row;
use prettytable::Table;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::market::Ticker;
use crate::portfolio::Frontier;
use crate::portfolio::PortfolioKind;
use crate::portfolio::SelectedPortfolios;
use crate::portfolio::SweepFailure;
use crate::returns::ReturnMatrix;
use crate::visualization;
use crate::visualization::GridPlotter;

pub const DAILY_RETURNS_CSV: &str = "daily_returns.csv";
pub const LOG_RETURNS_CSV: &str = "log_returns.csv";
pub const MONTHLY_RETURNS_CSV: &str = "monthly_returns.csv";
pub const COVARIANCE_CSV: &str = "covariance_matrix.csv";
pub const CORRELATION_CSV: &str = "correlation_matrix.csv";
pub const FRONTIER_CSV: &str = "efficient_frontier.csv";
pub const ALLOCATIONS_CSV: &str = "allocations.csv";
pub const FAILURES_CSV: &str = "sweep_failures.csv";
pub const PORTFOLIOS_JSON: &str = "portfolios.json";

pub const FRONTIER_HTML: &str = "efficient_frontier.html";
pub const SPAGHETTI_HTML: &str = "allocation_spaghetti.html";
pub const CUMULATIVE_HTML: &str = "cumulative_returns.html";
pub const DAILY_HTML: &str = "daily_returns.html";
pub const MONTHLY_HTML: &str = "monthly_returns.html";
pub const COVARIANCE_HTML: &str = "covariance_heatmap.html";
pub const CORRELATION_HTML: &str = "correlation_heatmap.html";

fn fmt(v: f64) -> String {
  format!("{v:.10}")
}

/// Dates down, tickers across.
pub fn write_return_matrix(path: &Path, returns: &ReturnMatrix) -> Result<()> {
  let mut writer = Writer::from_path(path)?;
  let mut header = vec!["Date".to_string()];
  header.extend(returns.tickers.iter().map(|t| t.to_string()));
  writer.write_record(&header)?;

  for (i, date) in returns.dates.iter().enumerate() {
    let mut row = vec![date.to_string()];
    row.extend(returns.values.row(i).iter().map(|v| fmt(*v)));
    writer.write_record(&row)?;
  }
  writer.flush()?;
  Ok(())
}

/// Square ticker-by-ticker matrix with row labels.
pub fn write_square_matrix(path: &Path, tickers: &[Ticker], matrix: &Array2<f64>) -> Result<()> {
  let mut writer = Writer::from_path(path)?;
  let mut header = vec![String::new()];
  header.extend(tickers.iter().map(|t| t.to_string()));
  writer.write_record(&header)?;

  for (i, ticker) in tickers.iter().enumerate() {
    let mut row = vec![ticker.to_string()];
    row.extend(matrix.row(i).iter().map(|v| fmt(*v)));
    writer.write_record(&row)?;
  }
  writer.flush()?;
  Ok(())
}

pub fn write_frontier(path: &Path, frontier: &Frontier, tickers: &[Ticker]) -> Result<()> {
  let mut writer = Writer::from_path(path)?;
  let mut header: Vec<String> = ["level", "expected_return", "risk", "sharpe"]
    .iter()
    .map(|s| s.to_string())
    .collect();
  header.extend(tickers.iter().map(|t| t.to_string()));
  writer.write_record(&header)?;

  for p in &frontier.points {
    let mut row = vec![fmt(p.level), fmt(p.expected_return), fmt(p.risk), fmt(p.sharpe)];
    row.extend(p.weights.iter().map(|w| fmt(*w)));
    writer.write_record(&row)?;
  }
  writer.flush()?;
  Ok(())
}

/// Weights indexed by frontier risk.
pub fn write_allocations(path: &Path, frontier: &Frontier, tickers: &[Ticker]) -> Result<()> {
  let mut writer = Writer::from_path(path)?;
  let mut header = vec!["risk".to_string()];
  header.extend(tickers.iter().map(|t| t.to_string()));
  writer.write_record(&header)?;

  for p in &frontier.points {
    let mut row = vec![fmt(p.risk)];
    row.extend(p.weights.iter().map(|w| fmt(*w)));
    writer.write_record(&row)?;
  }
  writer.flush()?;
  Ok(())
}

pub fn write_failures(path: &Path, failures: &[SweepFailure]) -> Result<()> {
  let mut writer = Writer::from_path(path)?;
  if failures.is_empty() {
    writer.write_record(["level", "reason"])?;
  }
  for f in failures {
    writer.serialize(f)?;
  }
  writer.flush()?;
  Ok(())
}

#[derive(Serialize)]
struct AllocationRecord<'a> {
  ticker: &'a Ticker,
  weight: f64,
}

#[derive(Serialize)]
struct PortfolioRecord<'a> {
  kind: PortfolioKind,
  expected_return: f64,
  risk: f64,
  sharpe: f64,
  allocations: Vec<AllocationRecord<'a>>,
}

pub fn write_portfolios(path: &Path, portfolios: &SelectedPortfolios) -> Result<()> {
  let records: Vec<PortfolioRecord<'_>> = portfolios
    .iter()
    .map(|p| PortfolioRecord {
      kind: p.kind,
      expected_return: p.point.expected_return,
      risk: p.point.risk,
      sharpe: p.point.sharpe,
      allocations: p
        .allocations()
        .map(|(ticker, weight)| AllocationRecord { ticker, weight })
        .collect(),
    })
    .collect();
  let writer = BufWriter::new(File::create(path)?);
  serde_json::to_writer_pretty(writer, &records)?;
  Ok(())
}

/// Console table of the named portfolios.
pub fn summary_table(portfolios: &SelectedPortfolios) -> Table {
  let mut table = Table::new();
  let mut titles = row!["Portfolio", "Expected return", "Risk", "Sharpe"];
  if let Some(first) = portfolios.iter().next() {
    for t in &first.tickers {
      titles.add_cell(prettytable::Cell::new(t.as_str()));
    }
  }
  table.set_titles(titles);

  for p in portfolios.iter() {
    let mut r = row![
      p.kind.to_string(),
      format!("{:.4}", p.point.expected_return),
      format!("{:.4}", p.point.risk),
      format!("{:.3}", p.point.sharpe)
    ];
    for (_, w) in p.allocations() {
      r.add_cell(prettytable::Cell::new(&format!("{:.2}%", w * 100.0)));
    }
    table.add_row(r);
  }
  table
}

/// Everything the reporting step needs from a run.
pub struct ReportInput<'a> {
  pub returns_daily: &'a ReturnMatrix,
  pub returns_log: &'a ReturnMatrix,
  pub returns_monthly: &'a ReturnMatrix,
  pub tickers: &'a [Ticker],
  pub covariance: &'a Array2<f64>,
  pub correlation: &'a Array2<f64>,
  pub frontier: &'a Frontier,
  pub portfolios: &'a SelectedPortfolios,
}

/// Write all data files, and the charts when `plots` is set. Returns the
/// paths written, in order.
pub fn write_all(out_dir: &Path, input: &ReportInput<'_>, plots: bool) -> Result<Vec<PathBuf>> {
  std::fs::create_dir_all(out_dir)?;
  let mut written = Vec::new();
  let mut path = |name: &str| {
    let p = out_dir.join(name);
    written.push(p.clone());
    p
  };

  write_return_matrix(&path(DAILY_RETURNS_CSV), input.returns_daily)?;
  write_return_matrix(&path(LOG_RETURNS_CSV), input.returns_log)?;
  write_return_matrix(&path(MONTHLY_RETURNS_CSV), input.returns_monthly)?;
  write_square_matrix(&path(COVARIANCE_CSV), input.tickers, input.covariance)?;
  write_square_matrix(&path(CORRELATION_CSV), input.tickers, input.correlation)?;
  write_frontier(&path(FRONTIER_CSV), input.frontier, input.tickers)?;
  write_allocations(&path(ALLOCATIONS_CSV), input.frontier, input.tickers)?;
  write_failures(&path(FAILURES_CSV), &input.frontier.failures)?;
  write_portfolios(&path(PORTFOLIOS_JSON), input.portfolios)?;

  if plots {
    visualization::write_plot(
      &visualization::frontier_chart(input.frontier, Some(input.portfolios)),
      &path(FRONTIER_HTML),
    )?;
    visualization::write_plot(
      &visualization::allocation_spaghetti(input.frontier, input.tickers),
      &path(SPAGHETTI_HTML),
    )?;
    for kind in PortfolioKind::ALL {
      let name = format!("{}.html", kind.file_stem());
      visualization::write_plot(
        &visualization::allocation_bar(input.portfolios.get(kind)),
        &path(&name),
      )?;
    }
    visualization::write_plot(
      &visualization::return_lines(
        &input.returns_daily.cumulative(),
        "Cumulative Returns",
        "Cumulative return",
      ),
      &path(CUMULATIVE_HTML),
    )?;
    visualization::write_plot(
      &GridPlotter::new()
        .title("Daily Returns")
        .cols(visualization::grid_cols(input.returns_daily.tickers.len()))
        .register_columns(input.returns_daily)
        .plot(),
      &path(DAILY_HTML),
    )?;
    visualization::write_plot(
      &visualization::return_lines(input.returns_monthly, "Monthly Returns", "Return"),
      &path(MONTHLY_HTML),
    )?;
    visualization::write_plot(
      &visualization::matrix_heatmap(input.covariance, input.tickers, "Covariance Matrix"),
      &path(COVARIANCE_HTML),
    )?;
    visualization::write_plot(
      &visualization::matrix_heatmap(input.correlation, input.tickers, "Correlation Matrix"),
      &path(CORRELATION_HTML),
    )?;
  }

  info!(dir = %out_dir.display(), files = written.len(), "wrote report");
  Ok(written)
}
