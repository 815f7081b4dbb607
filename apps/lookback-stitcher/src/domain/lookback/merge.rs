//! Merging and trimming of historical and recorded sequences.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::event::MarketEvent;

/// Outcome of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// Combined events, ascending by timestamp.
    pub events: Vec<MarketEvent>,
    /// Events dropped because their identity was already present.
    pub duplicates_removed: usize,
    /// Whether the concatenation was out of order and had to be sorted.
    pub reordered: bool,
}

/// Concatenate historical and recorded events.
///
/// The cutover makes both sequences time-disjoint in the expected case, so
/// concatenation is already ordered. The boundary event can still appear in
/// both (the recorded query is inclusive of the last historical timestamp),
/// and clock skew can produce overlap, so the result is stably sorted when
/// needed and de-duplicated on event identity, keeping the first copy.
#[must_use]
pub fn merge(historical: Vec<MarketEvent>, recorded: Vec<MarketEvent>) -> Merged {
    let mut events = historical;
    events.extend(recorded);

    let reordered = !events
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp);
    if reordered {
        events.sort_by_key(|event| event.timestamp);
    }

    let before = events.len();
    let mut seen = HashSet::with_capacity(before);
    events.retain(|event| seen.insert(event.key()));

    Merged {
        duplicates_removed: before - events.len(),
        events,
        reordered,
    }
}

/// Keep only events inside `[window_end - lookback, window_end]`.
///
/// `events` must be ascending by timestamp.
#[must_use]
pub fn trim_to_window(
    mut events: Vec<MarketEvent>,
    window_end: DateTime<Utc>,
    lookback: TimeDelta,
) -> Vec<MarketEvent> {
    let exact_start = window_end - lookback;
    let end = events.partition_point(|event| event.timestamp <= window_end);
    events.truncate(end);
    let start = events.partition_point(|event| event.timestamp < exact_start);
    events.drain(..start);
    events
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::event::BookLevels;

    fn event(symbol: &str, minute: i64) -> MarketEvent {
        let ts = Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap() + TimeDelta::minutes(minute);
        MarketEvent {
            data_type: "book_snapshot".to_string(),
            symbol: symbol.to_string(),
            exchange: "deribit".to_string(),
            name: "quote_1m".to_string(),
            interval_ms: 60_000,
            depth: Some(1),
            timestamp: ts,
            local_timestamp: ts,
            bids: BookLevels::default(),
            asks: BookLevels::default(),
        }
    }

    fn minutes(events: &[MarketEvent]) -> Vec<i64> {
        let origin = Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap();
        events
            .iter()
            .map(|e| (e.timestamp - origin).num_minutes())
            .collect()
    }

    #[test]
    fn disjoint_sequences_concatenate() {
        let hist = (0..3).map(|m| event("BTC", m)).collect();
        let rec = (3..5).map(|m| event("BTC", m)).collect();
        let merged = merge(hist, rec);
        assert_eq!(minutes(&merged.events), vec![0, 1, 2, 3, 4]);
        assert_eq!(merged.duplicates_removed, 0);
        assert!(!merged.reordered);
    }

    #[test]
    fn boundary_event_is_deduplicated() {
        let hist = (0..3).map(|m| event("BTC", m)).collect();
        let rec = (2..5).map(|m| event("BTC", m)).collect();
        let merged = merge(hist, rec);
        assert_eq!(minutes(&merged.events), vec![0, 1, 2, 3, 4]);
        assert_eq!(merged.duplicates_removed, 1);
    }

    #[test]
    fn overlap_is_sorted_and_deduplicated() {
        let hist = (0..5).map(|m| event("BTC", m)).collect();
        let rec = (3..7).map(|m| event("BTC", m)).collect();
        let merged = merge(hist, rec);
        assert!(merged.reordered);
        assert_eq!(minutes(&merged.events), vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(merged.duplicates_removed, 2);
    }

    #[test]
    fn same_timestamp_different_symbols_are_kept() {
        let hist = vec![event("BTC", 0), event("ETH", 0)];
        let rec = vec![event("BTC", 1), event("ETH", 1)];
        let merged = merge(hist, rec);
        assert_eq!(merged.events.len(), 4);
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[test]
    fn trim_drops_events_before_exact_start() {
        let events: Vec<_> = (0..10).map(|m| event("BTC", m)).collect();
        let end = events[9].timestamp;
        let trimmed = trim_to_window(events, end, TimeDelta::minutes(4));
        assert_eq!(minutes(&trimmed), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn trim_drops_events_after_window_end() {
        let events: Vec<_> = (0..10).map(|m| event("BTC", m)).collect();
        let end = events[6].timestamp;
        let trimmed = trim_to_window(events, end, TimeDelta::minutes(2));
        assert_eq!(minutes(&trimmed), vec![4, 5, 6]);
    }

    #[test]
    fn trim_everything_before_window() {
        let events: Vec<_> = (0..3).map(|m| event("BTC", m)).collect();
        let end = events[2].timestamp + TimeDelta::hours(2);
        assert!(trim_to_window(events, end, TimeDelta::minutes(30)).is_empty());
    }
}
