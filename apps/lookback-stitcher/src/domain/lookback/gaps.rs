//! Sampling gap detection over a stitched sequence.
//!
//! A gap is two consecutive events of the same series further apart than
//! the series' nominal interval. Series are keyed by exchange, symbol,
//! data type and name, so interleaved symbols do not mask each other.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::domain::event::MarketEvent;

/// A hole in one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplingGap {
    /// Instrument symbol.
    pub symbol: String,
    /// Series name.
    pub name: String,
    /// Timestamp of the event before the gap.
    pub after: DateTime<Utc>,
    /// Timestamp of the event after the gap.
    pub before: DateTime<Utc>,
    /// Nominal interval of the series in milliseconds.
    pub interval_ms: u64,
}

impl SamplingGap {
    /// Number of nominal samples missing inside the gap.
    #[must_use]
    pub fn missing_samples(&self) -> i64 {
        let interval = i64::try_from(self.interval_ms).unwrap_or(i64::MAX).max(1);
        ((self.before - self.after).num_milliseconds() / interval - 1).max(0)
    }
}

type SeriesKey<'a> = (&'a str, &'a str, &'a str, &'a str);

/// Find gaps in an ascending sequence.
#[must_use]
pub fn detect_gaps(events: &[MarketEvent]) -> Vec<SamplingGap> {
    let mut last_seen: HashMap<SeriesKey<'_>, &MarketEvent> = HashMap::new();
    let mut gaps = Vec::new();

    for event in events {
        let key = (
            event.exchange.as_str(),
            event.symbol.as_str(),
            event.data_type.as_str(),
            event.name.as_str(),
        );
        let Some(previous) = last_seen.insert(key, event) else {
            continue;
        };
        // no two timestamps are further apart than i64::MAX milliseconds
        let Ok(interval_ms) = i64::try_from(event.interval_ms) else {
            continue;
        };
        if interval_ms > 0
            && event.timestamp - previous.timestamp > TimeDelta::milliseconds(interval_ms)
        {
            gaps.push(SamplingGap {
                symbol: event.symbol.clone(),
                name: event.name.clone(),
                after: previous.timestamp,
                before: event.timestamp,
                interval_ms: event.interval_ms,
            });
        }
    }

    gaps
}
