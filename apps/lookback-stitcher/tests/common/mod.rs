//! Shared fakes for integration tests.
//!
//! Feeds are driven by tokio time, so tests run with a paused clock and
//! every scheduled delivery happens at a deterministic virtual instant.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;

use lookback_stitcher::{
    AnchoredClock, BookLevels, FeedError, FeedMessage, FeedStream, FeedSubscription, LiveFeed,
    MarketEvent, PriceLevel, RecordStore, ReplayFeed, ReplayWindow, SqliteRecordStore, StoreError,
};

/// Delay between an event's exchange timestamp and its delivery.
pub const DELIVERY_LATENCY: TimeDelta = TimeDelta::milliseconds(100);

/// Job start used across scenarios.
pub fn job_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 10, 12, 0, 30).unwrap()
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 10, h, m, 0).unwrap()
}

/// One-minute top-of-book sample.
pub fn quote(symbol: &str, timestamp: DateTime<Utc>) -> MarketEvent {
    let (bids, _) = BookLevels::from_levels([PriceLevel::new(27_500.0, 1.0)]);
    let (asks, _) = BookLevels::from_levels([PriceLevel::new(27_500.5, 2.5)]);
    MarketEvent {
        data_type: "book_snapshot".to_string(),
        symbol: symbol.to_string(),
        exchange: "deribit".to_string(),
        name: "quote_1m".to_string(),
        interval_ms: 60_000,
        depth: Some(1),
        timestamp,
        local_timestamp: timestamp + DELIVERY_LATENCY,
        bids,
        asks,
    }
}

/// Samples every minute in `[from, to]`.
pub fn minutes(symbol: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<MarketEvent> {
    std::iter::successors(Some(from), |ts| Some(*ts + TimeDelta::minutes(1)))
        .take_while(|ts| *ts <= to)
        .map(|ts| quote(symbol, ts))
        .collect()
}

pub fn clock() -> Arc<AnchoredClock> {
    Arc::new(AnchoredClock::starting_at(job_start()))
}

// =============================================================================
// Live feed
// =============================================================================

/// Delivers each event at its local timestamp, measured from `start`.
pub struct ScheduledLiveFeed {
    start: DateTime<Utc>,
    events: Vec<MarketEvent>,
    ends: bool,
    refuse: Option<FeedError>,
}

impl ScheduledLiveFeed {
    /// Feed that stays open after its last event.
    pub fn new(events: Vec<MarketEvent>) -> Self {
        Self {
            start: job_start(),
            events,
            ends: false,
            refuse: None,
        }
    }

    /// Feed that closes after its last event.
    pub fn ending(events: Vec<MarketEvent>) -> Self {
        Self {
            ends: true,
            ..Self::new(events)
        }
    }

    /// Feed whose subscription fails.
    pub fn refusing(error: FeedError) -> Self {
        Self {
            refuse: Some(error),
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl LiveFeed for ScheduledLiveFeed {
    async fn subscribe_live(&self, _: &FeedSubscription) -> Result<FeedStream, FeedError> {
        if let Some(error) = &self.refuse {
            return Err(error.clone());
        }

        let base = tokio::time::Instant::now();
        let start = self.start;
        let scheduled = stream::iter(self.events.clone()).then(move |event| async move {
            let offset = (event.local_timestamp - start).to_std().unwrap_or_default();
            tokio::time::sleep_until(base + offset).await;
            Ok(FeedMessage::Event(event))
        });

        if self.ends {
            Ok(scheduled.boxed())
        } else {
            Ok(scheduled.chain(stream::pending()).boxed())
        }
    }
}

// =============================================================================
// Replay feeds
// =============================================================================

/// Answers instantly with one sample per minute from the start of
/// `window.from` through `window.to`.
pub struct ImmediateReplay {
    symbol: String,
    requested: Mutex<Vec<ReplayWindow>>,
}

impl ImmediateReplay {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<ReplayWindow> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl ReplayFeed for ImmediateReplay {
    async fn subscribe_replay(
        &self,
        _: &FeedSubscription,
        window: &ReplayWindow,
    ) -> Result<FeedStream, FeedError> {
        self.requested.lock().push(*window);
        let day_start = window.from.and_time(NaiveTime::MIN).and_utc();
        let events = minutes(&self.symbol, day_start, window.to);
        Ok(stream::iter(events.into_iter().map(|e| Ok(FeedMessage::Event(e)))).boxed())
    }
}

/// Replay that never produces anything.
pub struct HangingReplay;

#[async_trait]
impl ReplayFeed for HangingReplay {
    async fn subscribe_replay(
        &self,
        _: &FeedSubscription,
        _: &ReplayWindow,
    ) -> Result<FeedStream, FeedError> {
        Ok(stream::pending().boxed())
    }
}

/// Replay whose subscription fails.
pub struct RefusingReplay;

#[async_trait]
impl ReplayFeed for RefusingReplay {
    async fn subscribe_replay(
        &self,
        _: &FeedSubscription,
        _: &ReplayWindow,
    ) -> Result<FeedStream, FeedError> {
        Err(FeedError::ConnectionFailed("replay refused".to_string()))
    }
}

// =============================================================================
// Store
// =============================================================================

/// SQLite store with switchable failures.
pub struct FlakyStore {
    pub inner: SqliteRecordStore,
    fail_inserts: bool,
    fail_queries: bool,
}

impl FlakyStore {
    pub fn failing_inserts() -> Self {
        Self {
            inner: SqliteRecordStore::open_in_memory().unwrap(),
            fail_inserts: true,
            fail_queries: false,
        }
    }

    pub fn failing_queries() -> Self {
        Self {
            inner: SqliteRecordStore::open_in_memory().unwrap(),
            fail_inserts: false,
            fail_queries: true,
        }
    }
}

impl RecordStore for FlakyStore {
    fn insert(&self, event: &MarketEvent) -> Result<bool, StoreError> {
        if self.fail_inserts {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.insert(event)
    }

    fn query_range(&self, from: DateTime<Utc>) -> Result<Vec<MarketEvent>, StoreError> {
        if self.fail_queries {
            return Err(StoreError::Unavailable("database locked".to_string()));
        }
        self.inner.query_range(from)
    }
}
