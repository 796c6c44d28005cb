//! # Return Series
//!
//! $$
//! r_t = \frac{P_t}{P_{t-1}} - 1, \qquad \ell_t = \ln\frac{P_t}{P_{t-1}}
//! $$
//!
//! Alignment of per-ticker price histories and derivation of daily, log and
//! month-end return matrices. Matrices are `periods x tickers`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::FrontierError;
use crate::error::Result;
use crate::market::PriceHistory;
use crate::market::Ticker;

/// Sampling frequency of the returns fed to the estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnFrequency {
  Daily,
  #[default]
  Monthly,
}

impl ReturnFrequency {
  pub fn periods_per_year(&self) -> f64 {
    match self {
      Self::Daily => 252.0,
      Self::Monthly => 12.0,
    }
  }
}

impl FromStr for ReturnFrequency {
  type Err = FrontierError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "daily" | "d" => Ok(Self::Daily),
      "monthly" | "m" => Ok(Self::Monthly),
      other => Err(FrontierError::InvalidInput(format!(
        "unknown return frequency '{other}'"
      ))),
    }
  }
}

impl Display for ReturnFrequency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Daily => write!(f, "daily"),
      Self::Monthly => write!(f, "monthly"),
    }
  }
}

/// Prices of all tickers on the dates they have in common.
#[derive(Clone, Debug)]
pub struct PriceFrame {
  pub dates: Vec<NaiveDate>,
  pub tickers: Vec<Ticker>,
  pub prices: Array2<f64>,
}

impl PriceFrame {
  /// Inner join of the histories on their dates.
  pub fn align(histories: &[PriceHistory]) -> Result<Self> {
    if histories.is_empty() {
      return Err(FrontierError::insufficient("no price histories to align"));
    }

    let n = histories.len();
    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (j, h) in histories.iter().enumerate() {
      for &(d, p) in &h.points {
        by_date.entry(d).or_insert_with(|| vec![None; n])[j] = Some(p);
      }
    }

    let total = by_date.len();
    let rows: Vec<(NaiveDate, Vec<f64>)> = by_date
      .into_iter()
      .filter_map(|(d, row)| row.into_iter().collect::<Option<Vec<f64>>>().map(|r| (d, r)))
      .collect();
    debug!(
      total_dates = total,
      common_dates = rows.len(),
      "aligned price histories"
    );

    if rows.len() < 2 {
      return Err(FrontierError::insufficient(format!(
        "only {} common date(s) across {} tickers",
        rows.len(),
        n
      )));
    }

    let prices = Array2::from_shape_fn((rows.len(), n), |(i, j)| rows[i].1[j]);
    Ok(Self {
      dates: rows.iter().map(|(d, _)| *d).collect(),
      tickers: histories.iter().map(|h| h.ticker.clone()).collect(),
      prices,
    })
  }

  pub fn n_dates(&self) -> usize {
    self.dates.len()
  }
}

/// Aligned per-period returns, one column per ticker.
#[derive(Clone, Debug)]
pub struct ReturnMatrix {
  pub dates: Vec<NaiveDate>,
  pub tickers: Vec<Ticker>,
  pub values: Array2<f64>,
}

impl ReturnMatrix {
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<Ticker>, values: Array2<f64>) -> Result<Self> {
    if values.nrows() != dates.len() || values.ncols() != tickers.len() {
      return Err(FrontierError::InvalidInput(format!(
        "return matrix is {}x{} but got {} dates and {} tickers",
        values.nrows(),
        values.ncols(),
        dates.len(),
        tickers.len()
      )));
    }
    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  pub fn n_periods(&self) -> usize {
    self.values.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.values.ncols()
  }

  pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
    self.values.column(j)
  }

  /// Compounded return path `prod(1 + r) - 1` per column.
  pub fn cumulative(&self) -> ReturnMatrix {
    let mut values = self.values.clone();
    for mut col in values.axis_iter_mut(Axis(1)) {
      let mut growth = 1.0;
      for v in col.iter_mut() {
        growth *= 1.0 + *v;
        *v = growth - 1.0;
      }
    }
    ReturnMatrix {
      dates: self.dates.clone(),
      tickers: self.tickers.clone(),
      values,
    }
  }
}

fn period_returns<F>(frame: &PriceFrame, rows: &[usize], f: F) -> ReturnMatrix
where
  F: Fn(f64, f64) -> f64,
{
  let n = frame.tickers.len();
  let periods = rows.len().saturating_sub(1);
  let values = Array2::from_shape_fn((periods, n), |(i, j)| {
    f(frame.prices[[rows[i], j]], frame.prices[[rows[i + 1], j]])
  });
  ReturnMatrix {
    dates: rows.iter().skip(1).map(|&r| frame.dates[r]).collect(),
    tickers: frame.tickers.clone(),
    values,
  }
}

/// Daily simple returns.
pub fn daily_returns(frame: &PriceFrame) -> ReturnMatrix {
  let rows: Vec<usize> = (0..frame.n_dates()).collect();
  period_returns(frame, &rows, |p0, p1| p1 / p0 - 1.0)
}

/// Daily log returns.
pub fn log_returns(frame: &PriceFrame) -> ReturnMatrix {
  let rows: Vec<usize> = (0..frame.n_dates()).collect();
  period_returns(frame, &rows, |p0, p1| (p1 / p0).ln())
}

/// Simple returns between the last observations of consecutive months.
pub fn monthly_returns(frame: &PriceFrame) -> ReturnMatrix {
  let mut month_ends: Vec<usize> = Vec::new();
  for (i, d) in frame.dates.iter().enumerate() {
    let next_same_month = frame
      .dates
      .get(i + 1)
      .is_some_and(|n| n.year() == d.year() && n.month() == d.month());
    if !next_same_month {
      month_ends.push(i);
    }
  }
  period_returns(frame, &month_ends, |p0, p1| p1 / p0 - 1.0)
}

/// All return views derived from one aligned price frame.
#[derive(Clone, Debug)]
pub struct ReturnSet {
  pub prices: PriceFrame,
  pub daily: ReturnMatrix,
  pub log: ReturnMatrix,
  pub monthly: ReturnMatrix,
}

impl ReturnSet {
  pub fn build(histories: &[PriceHistory]) -> Result<Self> {
    let prices = PriceFrame::align(histories)?;
    let daily = daily_returns(&prices);
    let log = log_returns(&prices);
    let monthly = monthly_returns(&prices);
    debug!(
      daily = daily.n_periods(),
      monthly = monthly.n_periods(),
      "built return series"
    );
    Ok(Self {
      prices,
      daily,
      log,
      monthly,
    })
  }

  pub fn for_frequency(&self, frequency: ReturnFrequency) -> &ReturnMatrix {
    match frequency {
      ReturnFrequency::Daily => &self.daily,
      ReturnFrequency::Monthly => &self.monthly,
    }
  }
}
