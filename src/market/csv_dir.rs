//! CSV directory price source: one `<TICKER>.csv` file per instrument.

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::debug;

use super::DateRange;
use super::PriceHistory;
use super::PriceSource;
use super::Ticker;
use crate::error::FrontierError;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct PriceRow {
  #[serde(alias = "Date")]
  date: NaiveDate,
  #[serde(alias = "Adj Close", alias = "adjclose")]
  adj_close: Option<f64>,
}

/// Reads `date,adj_close` files from a directory.
#[derive(Clone, Debug)]
pub struct CsvPriceSource {
  dir: PathBuf,
}

impl CsvPriceSource {
  pub fn new(dir: impl AsRef<Path>) -> Self {
    Self {
      dir: dir.as_ref().to_path_buf(),
    }
  }

  fn path_for(&self, ticker: &Ticker) -> PathBuf {
    self.dir.join(format!("{ticker}.csv"))
  }
}

impl PriceSource for CsvPriceSource {
  fn name(&self) -> &str {
    "csv"
  }

  fn fetch(&self, ticker: &Ticker, range: &DateRange) -> Result<PriceHistory> {
    let path = self.path_for(ticker);
    let file = match File::open(&path) {
      Ok(f) => f,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "price file not found");
        return Err(range.unavailable(ticker));
      }
      Err(e) => return Err(FrontierError::Io(e)),
    };

    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut points = Vec::new();
    for row in reader.deserialize::<PriceRow>() {
      let row = row?;
      if let Some(p) = row.adj_close {
        points.push((row.date, p));
      }
    }
    debug!(%ticker, rows = points.len(), "read price file");

    PriceHistory::new(ticker.clone(), points, range)
  }
}
