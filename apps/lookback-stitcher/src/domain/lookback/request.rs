//! Lookback job description.

use std::time::Duration;

use chrono::TimeDelta;

/// Errors raised while building a [`LookbackRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Exchange is empty.
    #[error("exchange cannot be empty")]
    EmptyExchange,
    /// No symbol was requested.
    #[error("at least one symbol is required")]
    NoSymbols,
    /// No data type was requested.
    #[error("at least one data type is required")]
    NoDataTypes,
    /// Lookback duration is zero.
    #[error("lookback duration must be greater than zero")]
    ZeroLookback,
    /// Duration does not fit the calendar arithmetic range.
    #[error("{0} duration is out of range")]
    DurationOutOfRange(&'static str),
}

/// One reconciliation job: what to fetch and how far back.
///
/// Symbols and data types are de-duplicated while keeping their first
/// occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookbackRequest {
    exchange: String,
    symbols: Vec<String>,
    data_types: Vec<String>,
    lookback: Duration,
    warmup: Duration,
}

impl LookbackRequest {
    /// Build a validated request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange, symbol set or data-type set is empty,
    /// if the lookback is zero, or if a duration cannot be represented as a
    /// calendar offset.
    pub fn new(
        exchange: impl Into<String>,
        symbols: impl IntoIterator<Item = impl Into<String>>,
        data_types: impl IntoIterator<Item = impl Into<String>>,
        lookback: Duration,
        warmup: Duration,
    ) -> Result<Self, RequestError> {
        let exchange = exchange.into().trim().to_string();
        if exchange.is_empty() {
            return Err(RequestError::EmptyExchange);
        }

        let symbols = unique_non_empty(symbols);
        if symbols.is_empty() {
            return Err(RequestError::NoSymbols);
        }

        let data_types = unique_non_empty(data_types);
        if data_types.is_empty() {
            return Err(RequestError::NoDataTypes);
        }

        if lookback.is_zero() {
            return Err(RequestError::ZeroLookback);
        }
        if TimeDelta::from_std(lookback).is_err() {
            return Err(RequestError::DurationOutOfRange("lookback"));
        }
        if TimeDelta::from_std(warmup).is_err() {
            return Err(RequestError::DurationOutOfRange("warmup"));
        }

        Ok(Self {
            exchange,
            symbols,
            data_types,
            lookback,
            warmup,
        })
    }

    /// Exchange identifier.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Requested symbols.
    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Requested data types (e.g. `quote_1m`).
    #[must_use]
    pub fn data_types(&self) -> &[String] {
        &self.data_types
    }

    /// Requested lookback duration.
    #[must_use]
    pub const fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Lookback as a calendar offset.
    #[must_use]
    pub fn lookback_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.lookback).unwrap_or(TimeDelta::MAX)
    }

    /// Recording warm-up duration.
    #[must_use]
    pub const fn warmup(&self) -> Duration {
        self.warmup
    }
}

fn unique_non_empty(values: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.into().trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
