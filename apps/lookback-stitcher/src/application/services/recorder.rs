//! Live Recorder
//!
//! Background task that drains a live feed into the record store. Only
//! events on their sampling grid are written; disconnect sentinels are
//! counted and dropped.
//!
//! The task checks its cancellation token before every message, so a stop
//! request is observed within one feed message. Inserts run on the blocking
//! pool and are awaited before the next check, so cancellation never lands
//! mid-write and a slow store never stalls an async worker.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FeedError, FeedMessage, FeedStream, FeedSubscription, LiveFeed, RecordStore, StoreError,
};
use crate::domain::event::MarketEvent;
use crate::infrastructure::metrics::{self, SkipReason};

// =============================================================================
// Error Type
// =============================================================================

/// Ways a recording can end other than a requested stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The live feed reported an unrecoverable error.
    #[error("live feed failed: {0}")]
    Feed(#[from] FeedError),

    /// The live feed ended on its own.
    #[error("live feed ended unexpectedly")]
    FeedEnded,

    /// An insert failed.
    #[error("record store failed: {0}")]
    Store(#[from] StoreError),

    /// The recording task panicked or was aborted.
    #[error("recorder task failed: {0}")]
    Task(String),

    /// The task did not observe cancellation within the stop timeout.
    #[error("recorder did not stop within {0:?}")]
    StopTimeout(Duration),
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one recording session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Events received from the feed.
    pub received: u64,
    /// Events written to the store.
    pub recorded: u64,
    /// Events rejected by the alignment filter.
    pub misaligned: u64,
    /// Aligned events whose identity was already stored.
    pub duplicates: u64,
    /// Disconnect sentinels discarded.
    pub disconnects: u64,
}

// =============================================================================
// Recorder
// =============================================================================

/// Starts recording sessions against a live feed.
pub struct LiveRecorder {
    feed: Arc<dyn LiveFeed>,
    store: Arc<dyn RecordStore>,
}

impl LiveRecorder {
    /// Create a recorder writing `feed` into `store`.
    #[must_use]
    pub fn new(feed: Arc<dyn LiveFeed>, store: Arc<dyn RecordStore>) -> Self {
        Self { feed, store }
    }

    /// Subscribe to the live feed and spawn the recording task.
    ///
    /// Returns once the subscription is established; recording continues in
    /// the background until the handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the live subscription cannot be established.
    pub async fn start(&self, subscription: &FeedSubscription) -> Result<RecordingHandle, FeedError> {
        let stream = self.feed.subscribe_live(subscription).await?;
        let cancel = CancellationToken::new();

        tracing::info!(
            exchange = %subscription.exchange,
            symbols = ?subscription.symbols,
            data_types = ?subscription.data_types,
            "Live recording started"
        );

        let join = tokio::spawn(record_loop(stream, Arc::clone(&self.store), cancel.clone()));

        Ok(RecordingHandle {
            cancel,
            join: Some(join),
        })
    }
}

async fn record_loop(
    mut stream: FeedStream,
    store: Arc<dyn RecordStore>,
    cancel: CancellationToken,
) -> Result<RecorderStats, RecordError> {
    let mut stats = RecorderStats::default();

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(?stats, "Live recorder cancelled");
                return Ok(stats);
            }
            message = stream.next() => message,
        };

        match message {
            Some(Ok(FeedMessage::Event(event))) => {
                record_event(&store, event, &mut stats).await?;
            }
            Some(Ok(FeedMessage::Disconnect(notice))) => {
                stats.disconnects += 1;
                metrics::record_disconnect(&notice.exchange);
                tracing::warn!(
                    exchange = %notice.exchange,
                    at = %notice.local_timestamp,
                    "Upstream disconnect reported by live feed"
                );
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, ?stats, "Live feed failed");
                return Err(RecordError::Feed(e));
            }
            None => {
                tracing::error!(?stats, "Live feed ended");
                return Err(RecordError::FeedEnded);
            }
        }
    }
}

async fn record_event(
    store: &Arc<dyn RecordStore>,
    event: MarketEvent,
    stats: &mut RecorderStats,
) -> Result<(), RecordError> {
    stats.received += 1;
    metrics::record_live_received();

    if !event.is_aligned() {
        stats.misaligned += 1;
        metrics::record_live_skipped(SkipReason::Misaligned);
        tracing::debug!(
            symbol = %event.symbol,
            name = %event.name,
            timestamp = %event.timestamp,
            "Skipping misaligned live event"
        );
        return Ok(());
    }

    let store = Arc::clone(store);
    let inserted = tokio::task::spawn_blocking(move || store.insert(&event))
        .await
        .map_err(|e| RecordError::Task(e.to_string()))??;

    if inserted {
        stats.recorded += 1;
        metrics::record_live_recorded();
    } else {
        stats.duplicates += 1;
        metrics::record_live_skipped(SkipReason::Duplicate);
    }
    Ok(())
}

// =============================================================================
// Recording Handle
// =============================================================================

/// Handle to a running recording task.
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct RecordingHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<Result<RecorderStats, RecordError>>>,
}

impl RecordingHandle {
    /// Whether the task has already exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the task and wait for it to exit.
    ///
    /// If the task does not observe cancellation within `timeout` it is
    /// aborted and [`RecordError::StopTimeout`] is returned.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the recording, if it ended on its own.
    pub async fn stop(mut self, timeout: Duration) -> Result<RecorderStats, RecordError> {
        self.cancel.cancel();

        let Some(mut join) = self.join.take() else {
            return Err(RecordError::Task("recorder already joined".to_string()));
        };

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RecordError::Task(e.to_string())),
            Err(_) => {
                join.abort();
                tracing::warn!(?timeout, "Live recorder did not stop in time, aborted");
                Err(RecordError::StopTimeout(timeout))
            }
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
