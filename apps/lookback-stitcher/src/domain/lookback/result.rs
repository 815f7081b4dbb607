//! Final output of a reconciliation.

use chrono::{DateTime, Utc};

use super::gaps::SamplingGap;
use crate::domain::event::MarketEvent;

/// A stitched, trimmed lookback window.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    /// Events in `[window_start, window_end]`, ascending by timestamp.
    pub events: Vec<MarketEvent>,
    /// `window_end - lookback`.
    pub window_start: DateTime<Utc>,
    /// Timestamp of the last recorded live event.
    pub window_end: DateTime<Utc>,
    /// Point from which recorded live data was read.
    pub cutover: DateTime<Utc>,
    /// Historical data was unavailable (timeout or empty replay) and live
    /// data alone covers the window.
    pub historical_degraded: bool,
    /// Events received from the historical replay.
    pub historical_count: usize,
    /// Events read back from the record store.
    pub recorded_count: usize,
    /// Duplicate identities dropped while merging.
    pub duplicates_removed: usize,
    /// Sampling gaps found in the final window.
    pub gaps: Vec<SamplingGap>,
}

impl ReconciliationResult {
    /// Number of events in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the window holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether every series in the window is sampled without holes.
    #[must_use]
    pub fn is_gap_free(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Timestamp of the first event.
    #[must_use]
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|event| event.timestamp)
    }

    /// Timestamp of the last event.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|event| event.timestamp)
    }
}
