//! # Pipeline Configuration
//!
//! Run-level settings: tickers, date range, price source, return frequency,
//! output directory and the embedded [`PortfolioEngineConfig`].

use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FrontierError;
use crate::error::Result;
use crate::market::CsvPriceSource;
use crate::market::DateRange;
use crate::market::PriceSource;
use crate::market::SyntheticPriceSource;
use crate::market::Ticker;
use crate::portfolio::PortfolioEngineConfig;
use crate::returns::ReturnFrequency;

pub const DEFAULT_OUTPUT_DIR: &str = "BDM_Outputs";

/// Where prices come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  #[default]
  Synthetic,
  Csv,
  Yahoo,
}

impl FromStr for SourceKind {
  type Err = FrontierError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "synthetic" | "synth" => Ok(Self::Synthetic),
      "csv" => Ok(Self::Csv),
      "yahoo" => Ok(Self::Yahoo),
      other => Err(FrontierError::InvalidInput(format!(
        "unknown price source '{other}'"
      ))),
    }
  }
}

impl Display for SourceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Synthetic => write!(f, "synthetic"),
      Self::Csv => write!(f, "csv"),
      Self::Yahoo => write!(f, "yahoo"),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
  pub kind: SourceKind,
  /// Directory of `<TICKER>.csv` files for the csv source.
  pub data_dir: Option<PathBuf>,
  /// Seed of the synthetic source.
  pub seed: u64,
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      kind: SourceKind::Synthetic,
      data_dir: None,
      seed: 42,
    }
  }
}

impl SourceConfig {
  /// Instantiate the configured price source.
  pub fn build(&self) -> Result<Box<dyn PriceSource>> {
    match self.kind {
      SourceKind::Synthetic => Ok(Box::new(SyntheticPriceSource::with_seed(self.seed))),
      SourceKind::Csv => {
        let dir = self.data_dir.as_ref().ok_or_else(|| {
          FrontierError::InvalidInput("the csv source needs a data directory".into())
        })?;
        Ok(Box::new(CsvPriceSource::new(dir)))
      }
      #[cfg(feature = "yahoo")]
      SourceKind::Yahoo => Ok(Box::new(crate::market::YahooPriceSource::new()?)),
      #[cfg(not(feature = "yahoo"))]
      SourceKind::Yahoo => Err(FrontierError::InvalidInput(
        "the yahoo source requires building with the `yahoo` feature".into(),
      )),
    }
  }
}

/// Complete configuration of one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub tickers: Vec<Ticker>,
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
  pub source: SourceConfig,
  /// Return series feeding the estimator.
  pub frequency: ReturnFrequency,
  /// Scale mean and covariance to yearly figures before optimising.
  pub annualize: bool,
  /// Abort on the first ticker without data instead of dropping it.
  pub strict_data: bool,
  pub output_dir: PathBuf,
  pub write_plots: bool,
  pub engine: PortfolioEngineConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      tickers: Vec::new(),
      start: None,
      end: None,
      source: SourceConfig::default(),
      frequency: ReturnFrequency::Monthly,
      annualize: false,
      strict_data: false,
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      write_plots: true,
      engine: PortfolioEngineConfig::default(),
    }
  }
}

impl PipelineConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn from_json_str(text: &str) -> Result<Self> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn range(&self) -> Result<DateRange> {
    match (self.start, self.end) {
      (Some(start), Some(end)) => DateRange::new(start, end),
      _ => Err(FrontierError::InvalidInput(
        "both a start and an end date are required".into(),
      )),
    }
  }

  /// Tickers with duplicates removed, first occurrence kept.
  pub fn unique_tickers(&self) -> Result<Vec<Ticker>> {
    let mut out: Vec<Ticker> = Vec::with_capacity(self.tickers.len());
    for t in &self.tickers {
      if !out.contains(t) {
        out.push(t.clone());
      }
    }
    if out.is_empty() {
      return Err(FrontierError::InvalidInput("ticker list is empty".into()));
    }
    Ok(out)
  }
}
