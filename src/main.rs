//! Command-line front-end: fetch prices, trace the efficient frontier, pick
//! three portfolios and write the report directory.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use portfolio_frontier::config::PipelineConfig;
use portfolio_frontier::config::SourceKind;
use portfolio_frontier::market::parse_tickers;
use portfolio_frontier::market::DateRange;
use portfolio_frontier::pipeline;
use portfolio_frontier::portfolio::BalancedRule;
use portfolio_frontier::portfolio::SolverKind;
use portfolio_frontier::portfolio::Sweep;
use portfolio_frontier::returns::ReturnFrequency;
use tracing::info;
use tracing::warn;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SweepKind {
  RiskGrid,
  Risk,
  Return,
}

#[derive(Parser, Debug)]
#[command(name = "portfolio-frontier")]
#[command(about = "Trace a mean-variance efficient frontier and pick three portfolios", long_about = None)]
struct Cli {
  /// Comma separated tickers, e.g. AAPL,MSFT,NVDA
  #[arg(long)]
  tickers: Option<String>,

  /// First date (YYYY-MM-DD, inclusive)
  #[arg(long)]
  start: Option<String>,

  /// Last date (YYYY-MM-DD, inclusive)
  #[arg(long)]
  end: Option<String>,

  /// Price source: synthetic, csv or yahoo
  #[arg(long)]
  source: Option<SourceKind>,

  /// Directory of <TICKER>.csv files for the csv source
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Seed of the synthetic source
  #[arg(long)]
  seed: Option<u64>,

  /// Output directory (default BDM_Outputs)
  #[arg(long)]
  out: Option<PathBuf>,

  /// Returns feeding the optimiser: monthly or daily
  #[arg(long)]
  frequency: Option<ReturnFrequency>,

  /// Annualise mean and covariance before optimising
  #[arg(long)]
  annualize: bool,

  /// Abort when a ticker has no data instead of dropping it
  #[arg(long)]
  strict: bool,

  #[arg(long, value_enum)]
  sweep: Option<SweepKind>,

  /// Number of levels of the risk grid
  #[arg(long)]
  points: Option<usize>,

  /// Explicit target risks for the risk sweep
  #[arg(long, value_delimiter = ',')]
  risk_levels: Option<Vec<f64>>,

  #[arg(long)]
  return_start: Option<f64>,

  #[arg(long)]
  return_end: Option<f64>,

  #[arg(long)]
  return_step: Option<f64>,

  #[arg(long)]
  return_extension: Option<f64>,

  /// Allow negative weights
  #[arg(long)]
  allow_short: bool,

  /// Maximum number of holdings per portfolio
  #[arg(long)]
  max_assets: Option<usize>,

  /// Backend: clarabel, nelder-mead or analytic
  #[arg(long)]
  solver: Option<SolverKind>,

  /// Balanced pick: midpoint, max-sharpe or median
  #[arg(long)]
  balanced: Option<BalancedRule>,

  #[arg(long)]
  risk_free: Option<f64>,

  /// JSON configuration file; flags override its values
  #[arg(long)]
  config: Option<PathBuf>,

  /// Skip the HTML charts
  #[arg(long)]
  no_plots: bool,

  /// Show a progress bar while sweeping
  #[arg(long)]
  progress: bool,

  #[arg(long, default_value = "info")]
  log_level: String,
}

impl Cli {
  fn any_return_flag(&self) -> bool {
    self.return_start.is_some()
      || self.return_end.is_some()
      || self.return_step.is_some()
      || self.return_extension.is_some()
  }

  fn sweep_override(&self, current: &Sweep) -> Result<Option<Sweep>> {
    let kind = match self.sweep {
      Some(kind) => kind,
      None if self.risk_levels.is_some() => SweepKind::Risk,
      None if self.points.is_some() => SweepKind::RiskGrid,
      None if self.any_return_flag() => SweepKind::Return,
      None => return Ok(None),
    };

    let sweep = match kind {
      SweepKind::RiskGrid => Sweep::RiskGrid {
        points: self.points.unwrap_or(25),
      },
      SweepKind::Risk => Sweep::Risk {
        levels: self
          .risk_levels
          .clone()
          .context("--sweep risk needs --risk-levels")?,
      },
      SweepKind::Return => current.return_with(
        self.return_start,
        self.return_end,
        self.return_step,
        self.return_extension,
      ),
    };
    Ok(Some(sweep))
  }

  fn into_config(self) -> Result<PipelineConfig> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::from_json_file(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?,
      None => PipelineConfig::default(),
    };

    if let Some(list) = &self.tickers {
      config.tickers = parse_tickers(list).context("invalid --tickers")?;
    }
    match (&self.start, &self.end) {
      (Some(start), Some(end)) => {
        let range = DateRange::parse(start, end).context("invalid date range")?;
        config.start = Some(range.start);
        config.end = Some(range.end);
      }
      (Some(start), None) => {
        config.start = Some(DateRange::parse(start, start).context("invalid --start")?.start);
      }
      (None, Some(end)) => {
        config.end = Some(DateRange::parse(end, end).context("invalid --end")?.end);
      }
      (None, None) => {}
    }

    if let Some(kind) = self.source {
      config.source.kind = kind;
    }
    if let Some(dir) = &self.data_dir {
      config.source.data_dir = Some(dir.clone());
      if self.source.is_none() {
        config.source.kind = SourceKind::Csv;
      }
    }
    if let Some(seed) = self.seed {
      config.source.seed = seed;
    }
    if let Some(out) = &self.out {
      config.output_dir = out.clone();
    }
    if let Some(frequency) = self.frequency {
      config.frequency = frequency;
    }
    config.annualize |= self.annualize;
    config.strict_data |= self.strict;
    config.write_plots &= !self.no_plots;

    if let Some(sweep) = self.sweep_override(&config.engine.sweep)? {
      config.engine.sweep = sweep;
    }
    config.engine.constraints.allow_short |= self.allow_short;
    if self.max_assets.is_some() {
      config.engine.constraints.max_assets = self.max_assets;
    }
    if let Some(solver) = self.solver {
      config.engine.solver = solver;
    }
    if let Some(rule) = self.balanced {
      config.engine.balanced = rule;
    }
    if let Some(rf) = self.risk_free {
      config.engine.risk_free = rf;
    }
    config.engine.show_progress |= self.progress;

    Ok(config)
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = match cli.log_level.to_lowercase().as_str() {
    "trace" => Level::TRACE,
    "debug" => Level::DEBUG,
    "info" => Level::INFO,
    "warn" => Level::WARN,
    "error" => Level::ERROR,
    _ => Level::INFO,
  };
  let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
  tracing::subscriber::set_global_default(subscriber)?;

  let config = cli.into_config()?;
  let (output, written) =
    pipeline::run_and_report(&config).context("portfolio frontier run failed")?;

  if !output.skipped.is_empty() {
    let names: Vec<&str> = output.skipped.iter().map(|t| t.as_str()).collect();
    warn!("dropped tickers without data: {}", names.join(", "));
  }
  info!(
    files = written.len(),
    dir = %config.output_dir.display(),
    "done"
  );
  Ok(())
}
