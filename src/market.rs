//! # Market Data
//!
//! $$
//! (\text{ticker}, [t_0, t_1]) \mapsto \{(t_k, P_{t_k})\}_{t_0 \le t_k \le t_1}
//! $$
//!
//! Price history retrieval behind the [`PriceSource`] trait.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::FrontierError;
use crate::error::Result;

pub mod csv_dir;
pub mod synthetic;
#[cfg(feature = "yahoo")]
pub mod yahoo;

pub use csv_dir::CsvPriceSource;
pub use synthetic::SyntheticPriceSource;
#[cfg(feature = "yahoo")]
pub use yahoo::YahooPriceSource;

/// Identifier of one tradable instrument.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
  /// Normalize (trim, upper-case) and validate a ticker symbol.
  pub fn new(symbol: &str) -> Result<Self> {
    let s = symbol.trim().to_uppercase();
    if s.is_empty() {
      return Err(FrontierError::InvalidInput("empty ticker symbol".into()));
    }
    Ok(Self(s))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Display for Ticker {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Ticker {
  type Err = FrontierError;

  fn from_str(s: &str) -> Result<Self> {
    Self::new(s)
  }
}

impl TryFrom<String> for Ticker {
  type Error = FrontierError;

  fn try_from(s: String) -> Result<Self> {
    Self::new(&s)
  }
}

impl From<Ticker> for String {
  fn from(t: Ticker) -> Self {
    t.0
  }
}

/// Parse a comma separated ticker list, dropping duplicates (first one wins).
pub fn parse_tickers(list: &str) -> Result<Vec<Ticker>> {
  let mut out: Vec<Ticker> = Vec::new();
  for raw in list.split(',').filter(|s| !s.trim().is_empty()) {
    let t = Ticker::new(raw)?;
    if !out.contains(&t) {
      out.push(t);
    }
  }
  if out.is_empty() {
    return Err(FrontierError::InvalidInput("ticker list is empty".into()));
  }
  Ok(out)
}

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl DateRange {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
    if start > end {
      return Err(FrontierError::InvalidInput(format!(
        "start date {start} is after end date {end}"
      )));
    }
    Ok(Self { start, end })
  }

  /// Parse two ISO 8601 (`YYYY-MM-DD`) dates.
  pub fn parse(start: &str, end: &str) -> Result<Self> {
    let parse = |s: &str| {
      NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| FrontierError::InvalidInput(format!("invalid date '{s}': {e}")))
    };
    Self::new(parse(start)?, parse(end)?)
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    date >= self.start && date <= self.end
  }

  pub(crate) fn unavailable(&self, ticker: &Ticker) -> FrontierError {
    FrontierError::DataUnavailable {
      ticker: ticker.to_string(),
      start: self.start,
      end: self.end,
    }
  }
}

/// Date-ordered adjusted close prices of one ticker.
#[derive(Clone, Debug)]
pub struct PriceHistory {
  pub ticker: Ticker,
  pub points: Vec<(NaiveDate, f64)>,
}

impl PriceHistory {
  /// Sort, de-duplicate by date (last wins), clip to `range` and drop
  /// non-finite or non-positive prices.
  pub fn new(ticker: Ticker, points: Vec<(NaiveDate, f64)>, range: &DateRange) -> Result<Self> {
    let mut points: Vec<(NaiveDate, f64)> = points
      .into_iter()
      .filter(|(d, p)| range.contains(*d) && p.is_finite() && *p > 0.0)
      .collect();
    points.sort_by_key(|(d, _)| *d);

    let mut dedup: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
    for (d, p) in points {
      match dedup.last_mut() {
        Some(last) if last.0 == d => last.1 = p,
        _ => dedup.push((d, p)),
      }
    }

    if dedup.is_empty() {
      return Err(range.unavailable(&ticker));
    }

    Ok(Self {
      ticker,
      points: dedup,
    })
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }
}

/// A provider of historical prices.
pub trait PriceSource {
  /// Short name used in logs.
  fn name(&self) -> &str;

  /// Fetch adjusted close prices for `ticker` within `range`.
  fn fetch(&self, ticker: &Ticker, range: &DateRange) -> Result<PriceHistory>;
}

impl<S: PriceSource + ?Sized> PriceSource for Box<S> {
  fn name(&self) -> &str {
    (**self).name()
  }

  fn fetch(&self, ticker: &Ticker, range: &DateRange) -> Result<PriceHistory> {
    (**self).fetch(ticker, range)
  }
}

/// Histories that could be fetched plus the tickers that were dropped.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
  pub histories: Vec<PriceHistory>,
  pub skipped: Vec<Ticker>,
}

/// Fetch every ticker from `source`.
///
/// A ticker without data is dropped with a warning, or aborts the run when
/// `strict` is set. Having no ticker left is always an error.
pub fn fetch_all<S: PriceSource + ?Sized>(
  source: &S,
  tickers: &[Ticker],
  range: &DateRange,
  strict: bool,
) -> Result<FetchOutcome> {
  let mut histories = Vec::with_capacity(tickers.len());
  let mut skipped = Vec::new();
  let mut last_err = None;

  for ticker in tickers {
    match source.fetch(ticker, range) {
      Ok(h) => histories.push(h),
      Err(e @ FrontierError::DataUnavailable { .. }) => {
        if strict {
          return Err(e);
        }
        warn!(source = source.name(), %ticker, "no valid data, dropping ticker: {e}");
        skipped.push(ticker.clone());
        last_err = Some(e);
      }
      Err(e) => return Err(e),
    }
  }

  if histories.is_empty() {
    return Err(last_err.unwrap_or_else(|| {
      FrontierError::InvalidInput("no tickers were requested".into())
    }));
  }

  Ok(FetchOutcome { histories, skipped })
}
