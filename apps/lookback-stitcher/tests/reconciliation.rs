//! Reconciliation Integration Tests
//!
//! Full jobs against scripted feeds on a paused clock. The job starts at
//! 12:00:30; live samples arrive once a minute, 100ms after their exchange
//! timestamp.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tokio_test::{assert_err, assert_ok};

use common::{
    FlakyStore, HangingReplay, ImmediateReplay, RefusingReplay, ScheduledLiveFeed, at, clock,
    minutes,
};
use lookback_stitcher::{
    FeedError, LiveFeed, LookbackRequest, ReconcileError, Reconciler, ReconcilerSettings,
    RecordStore, ReplayFeed, SqliteRecordStore, Stage,
};

const SYMBOL: &str = "BTC-PERPETUAL";

fn request(lookback: Duration) -> LookbackRequest {
    LookbackRequest::new(
        "deribit",
        [SYMBOL],
        ["quote_1m"],
        lookback,
        Duration::from_secs(15 * 60),
    )
    .unwrap()
}

fn settings(historical_timeout: Duration) -> ReconcilerSettings {
    ReconcilerSettings {
        historical_lag: TimeDelta::minutes(14),
        historical_timeout,
        recorder_stop_timeout: Duration::from_secs(5),
        with_disconnect_messages: false,
    }
}

fn reconciler(
    live: Arc<dyn LiveFeed>,
    replay: Arc<dyn ReplayFeed>,
    store: Arc<dyn RecordStore>,
    historical_timeout: Duration,
) -> Reconciler {
    Reconciler::new(live, replay, store, clock(), settings(historical_timeout))
}

fn timestamps(events: &[lookback_stitcher::MarketEvent]) -> Vec<DateTime<Utc>> {
    events.iter().map(|event| event.timestamp).collect()
}

// =============================================================================
// Complete jobs
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stitches_replay_and_live_into_exact_window() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));
    let replay = Arc::new(ImmediateReplay::new(SYMBOL));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::clone(&replay) as Arc<dyn ReplayFeed>,
        store,
        Duration::from_secs(30 * 60),
    );
    let result = assert_ok!(job.reconcile(&request(Duration::from_secs(2 * 3600))).await);

    // warm-up ends at 12:15:30, so the replay runs up to 12:01:30
    let requested = replay.requested();
    assert_eq!(requested.len(), 1);
    assert_eq!(
        requested[0].from,
        NaiveDate::from_ymd_opt(2023, 5, 10).unwrap()
    );
    assert_eq!(requested[0].to, at(12, 1) + TimeDelta::seconds(30));

    assert!(!result.historical_degraded);
    assert_eq!(result.cutover, at(12, 1));
    assert_eq!(result.historical_count, 722);
    assert_eq!(result.recorded_count, 15);
    assert_eq!(result.duplicates_removed, 1);

    assert_eq!(result.window_end, at(12, 15));
    assert_eq!(result.window_start, at(10, 15));
    assert_eq!(result.len(), 121);
    assert_eq!(timestamps(&result.events), timestamps(&minutes(SYMBOL, at(10, 15), at(12, 15))));
    assert!(result.is_gap_free());
}

#[tokio::test(start_paused = true)]
async fn historical_timeout_falls_back_to_recorded_data() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::new(HangingReplay),
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Duration::from_secs(10 * 60),
    );
    let result = assert_ok!(job.reconcile(&request(Duration::from_secs(2 * 3600))).await);

    // the fetch gives up at 12:25:30
    assert!(result.historical_degraded);
    assert_eq!(result.historical_count, 0);
    assert_eq!(result.cutover, at(10, 25) + TimeDelta::seconds(30));
    assert_eq!(result.window_end, at(12, 25));
    assert_eq!(result.len(), 25);

    let stored = store.query_range(DateTime::UNIX_EPOCH).unwrap();
    assert_eq!(result.events, stored);
}

#[tokio::test(start_paused = true)]
async fn degraded_window_is_trimmed_to_lookback() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(live, Arc::new(HangingReplay), store, Duration::from_secs(10 * 60));
    let result = assert_ok!(job.reconcile(&request(Duration::from_secs(10 * 60))).await);

    // cutover is 12:15:30, so only 12:16..12:25 is read back
    assert!(result.historical_degraded);
    assert_eq!(result.window_start, at(12, 15));
    assert_eq!(timestamps(&result.events), timestamps(&minutes(SYMBOL, at(12, 16), at(12, 25))));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn empty_recording_is_insufficient() {
    let live = Arc::new(ScheduledLiveFeed::new(Vec::new()));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::new(ImmediateReplay::new(SYMBOL)),
        store,
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert!(matches!(error, ReconcileError::InsufficientData { .. }));
    assert_eq!(error.stage(), Stage::Trim);
}

#[tokio::test(start_paused = true)]
async fn live_subscription_failure_aborts_before_warmup() {
    let refused = FeedError::ConnectionFailed("connection refused".to_string());
    let live = Arc::new(ScheduledLiveFeed::refusing(refused.clone()));
    let replay = Arc::new(ImmediateReplay::new(SYMBOL));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::clone(&replay) as Arc<dyn ReplayFeed>,
        store,
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert_eq!(
        error,
        ReconcileError::FeedUnavailable {
            stage: Stage::StartRecording,
            source: refused,
        }
    );
    assert!(replay.requested().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replay_failure_is_not_absorbed() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::new(RefusingReplay),
        store,
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert!(matches!(
        error,
        ReconcileError::FeedUnavailable {
            stage: Stage::FetchHistorical,
            source: FeedError::ConnectionFailed(_),
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn live_feed_ending_during_warmup_fails_job() {
    let live = Arc::new(ScheduledLiveFeed::ending(minutes(SYMBOL, at(12, 1), at(12, 5))));
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());

    let job = reconciler(
        live,
        Arc::new(ImmediateReplay::new(SYMBOL)),
        store,
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert!(matches!(
        error,
        ReconcileError::FeedUnavailable {
            stage: Stage::WarmUp,
            source: FeedError::ConnectionLost(_),
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn store_query_failure_is_reported() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));

    let job = reconciler(
        live,
        Arc::new(ImmediateReplay::new(SYMBOL)),
        Arc::new(FlakyStore::failing_queries()),
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert!(matches!(
        error,
        ReconcileError::StorageUnavailable {
            stage: Stage::QueryRecorded,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn store_insert_failure_stops_recording() {
    let live = Arc::new(ScheduledLiveFeed::new(minutes(SYMBOL, at(12, 1), at(12, 40))));

    let job = reconciler(
        live,
        Arc::new(ImmediateReplay::new(SYMBOL)),
        Arc::new(FlakyStore::failing_inserts()),
        Duration::from_secs(30 * 60),
    );
    let error = assert_err!(job.reconcile(&request(Duration::from_secs(3600))).await);

    assert!(matches!(
        error,
        ReconcileError::StorageUnavailable {
            stage: Stage::WarmUp,
            ..
        }
    ));
}
