//! # Errors
//!
//! $$
//! \text{run} \to \{\text{frontier}\} \cup \{\text{data},\ \text{solver},\ \text{io}\ \text{failure}\}
//! $$
//!
//! Error kinds surfaced by the frontier pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// Error type for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum FrontierError {
  /// A ticker/date range yielded no usable prices.
  #[error("no data available for {ticker} between {start} and {end}")]
  DataUnavailable {
    ticker: String,
    start: NaiveDate,
    end: NaiveDate,
  },

  /// Too few periods, or gaps left after alignment.
  #[error("insufficient data: {reason}")]
  InsufficientData { reason: String },

  /// A single sweep level could not be solved.
  #[error("sweep level {level:.6} is infeasible: {reason}")]
  SolverInfeasible { level: f64, reason: String },

  /// The optimization backend cannot be invoked at all.
  #[error("solver backend '{backend}' is unavailable: {reason}")]
  SolverUnavailable {
    backend: &'static str,
    reason: String,
  },

  /// Every sweep level was infeasible.
  #[error("no feasible portfolios found on the frontier")]
  EmptyFrontier,

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Csv(#[from] csv::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl FrontierError {
  pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
    Self::InsufficientData {
      reason: reason.into(),
    }
  }

  pub(crate) fn infeasible(level: f64, reason: impl Into<String>) -> Self {
    Self::SolverInfeasible {
      level,
      reason: reason.into(),
    }
  }

  pub(crate) fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
    Self::SolverUnavailable {
      backend,
      reason: reason.into(),
    }
  }

  /// Whether a sweep may record this error and move on to the next level.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::SolverInfeasible { .. })
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FrontierError>;
