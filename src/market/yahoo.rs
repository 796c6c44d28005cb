//! Yahoo Finance daily adjusted closes.

use chrono::Datelike;
use chrono::NaiveDate;
use time::Month;
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

use super::DateRange;
use super::PriceHistory;
use super::PriceSource;
use super::Ticker;
use crate::error::FrontierError;
use crate::error::Result;

/// Fetches quote history from Yahoo Finance.
///
/// The connector is async; each fetch drives it on a private
/// current-thread runtime so callers stay synchronous.
pub struct YahooPriceSource {
  connector: yahoo::YahooConnector,
}

fn to_offset(date: NaiveDate) -> Result<OffsetDateTime> {
  let month = Month::try_from(date.month() as u8)
    .map_err(|e| FrontierError::InvalidInput(e.to_string()))?;
  let day = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
    .map_err(|e| FrontierError::InvalidInput(e.to_string()))?;
  Ok(day.midnight().assume_utc())
}

fn to_naive(ts: i64) -> Option<NaiveDate> {
  let dt = OffsetDateTime::from_unix_timestamp(ts).ok()?;
  NaiveDate::from_ymd_opt(dt.year(), dt.month() as u32, dt.day() as u32)
}

impl YahooPriceSource {
  pub fn new() -> Result<Self> {
    let connector = yahoo::YahooConnector::new()
      .map_err(|e| FrontierError::InvalidInput(format!("cannot build yahoo connector: {e}")))?;
    Ok(Self { connector })
  }
}

impl PriceSource for YahooPriceSource {
  fn name(&self) -> &str {
    "yahoo"
  }

  fn fetch(&self, ticker: &Ticker, range: &DateRange) -> Result<PriceHistory> {
    let start = to_offset(range.start)?;
    let end = to_offset(range.end.succ_opt().unwrap_or(range.end))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()?;

    let quotes = runtime.block_on(async {
      let response = self
        .connector
        .get_quote_history(ticker.as_str(), start, end)
        .await?;
      response.quotes()
    });

    let quotes = match quotes {
      Ok(q) => q,
      Err(e) => {
        debug!(%ticker, "yahoo request failed: {e}");
        return Err(range.unavailable(ticker));
      }
    };

    let points = quotes
      .iter()
      .filter_map(|q| to_naive(q.timestamp as i64).map(|d| (d, q.adjclose)))
      .collect();

    PriceHistory::new(ticker.clone(), points, range)
  }
}
