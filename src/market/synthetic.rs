//! # Synthetic Prices
//!
//! $$
//! d\ln S^i_t = \left(\mu_i - \tfrac12(\beta_i^2\sigma_m^2 + \sigma_i^2)\right)dt + \beta_i\sigma_m\,dW^m_t + \sigma_i\,dW^i_t
//! $$
//!
//! Seeded one-factor geometric Brownian motion on business days. The market
//! factor path only depends on the seed, so every ticker fetched from the same
//! source shares it and the series come out correlated.

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::Weekday;
use impl_new_derive::ImplNew;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

use super::DateRange;
use super::PriceHistory;
use super::PriceSource;
use super::Ticker;
use crate::error::FrontierError;
use crate::error::Result;

const DT: f64 = 1.0 / 252.0;

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct SyntheticPriceSource {
  /// RNG seed shared by the market factor and the per-ticker draws.
  pub seed: u64,
  /// Annualized volatility of the common market factor.
  pub market_vol: f64,
}

impl Default for SyntheticPriceSource {
  fn default() -> Self {
    Self {
      seed: 42,
      market_vol: 0.18,
    }
  }
}

/// Per-ticker model parameters.
#[derive(Clone, Copy, Debug)]
struct AssetParams {
  drift: f64,
  beta: f64,
  idio_vol: f64,
  s0: f64,
}

// FNV-1a, stable across platforms and toolchains.
fn ticker_hash(ticker: &Ticker) -> u64 {
  ticker
    .as_str()
    .bytes()
    .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
      (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn business_days(range: &DateRange) -> Vec<NaiveDate> {
  range
    .start
    .iter_days()
    .take_while(|d| *d <= range.end)
    .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
    .collect()
}

impl SyntheticPriceSource {
  pub fn with_seed(seed: u64) -> Self {
    Self {
      seed,
      ..Self::default()
    }
  }

  fn asset_params(&self, ticker: &Ticker) -> AssetParams {
    let mut rng = StdRng::seed_from_u64(self.seed ^ ticker_hash(ticker));
    AssetParams {
      drift: rng.gen_range(0.02..0.30),
      beta: rng.gen_range(0.6..1.4),
      idio_vol: rng.gen_range(0.10..0.35),
      s0: rng.gen_range(20.0..400.0),
    }
  }

  fn normal() -> Result<Normal<f64>> {
    Normal::new(0.0, 1.0).map_err(|e| FrontierError::InvalidInput(e.to_string()))
  }
}

impl PriceSource for SyntheticPriceSource {
  fn name(&self) -> &str {
    "synthetic"
  }

  fn fetch(&self, ticker: &Ticker, range: &DateRange) -> Result<PriceHistory> {
    if !(self.market_vol.is_finite() && self.market_vol >= 0.0) {
      return Err(FrontierError::InvalidInput(format!(
        "market volatility must be non-negative, got {}",
        self.market_vol
      )));
    }

    let days = business_days(range);
    if days.is_empty() {
      return Err(range.unavailable(ticker));
    }

    let normal = Self::normal()?;
    let params = self.asset_params(ticker);
    let mut market_rng = StdRng::seed_from_u64(self.seed);
    let mut idio_rng = StdRng::seed_from_u64(self.seed.rotate_left(17) ^ ticker_hash(ticker));

    let total_var = params.beta.powi(2) * self.market_vol.powi(2) + params.idio_vol.powi(2);
    let drift_dt = (params.drift - 0.5 * total_var) * DT;
    let sqrt_dt = DT.sqrt();

    let mut log_s = params.s0.ln();
    let mut points = Vec::with_capacity(days.len());
    points.push((days[0], params.s0));
    for &day in &days[1..] {
      let zm: f64 = normal.sample(&mut market_rng);
      let zi: f64 = normal.sample(&mut idio_rng);
      log_s += drift_dt + params.beta * self.market_vol * sqrt_dt * zm + params.idio_vol * sqrt_dt * zi;
      points.push((day, log_s.exp()));
    }

    PriceHistory::new(ticker.clone(), points, range)
  }
}
