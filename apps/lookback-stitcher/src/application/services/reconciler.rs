//! Reconciler
//!
//! Stitches a historical replay and recorded live data into one lookback
//! window ending at the last recorded live event.
//!
//! # Job Flow
//!
//! ```text
//! start recorder ──► warm up ──► fetch replay (timeout) ──► cutover
//!        │                                                     │
//!        │                                   query store from cutover
//!        │                                                     │
//!        └──────────────── stop recorder ◄─────────────────────┘
//!                               │
//!                     merge ──► trim ──► gap check
//! ```
//!
//! The recorder runs from before the replay is requested until after the
//! store is read, so the live side covers everything the replay lacks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::error::{ReconcileError, Stage};
use super::fetcher::{DEFAULT_HISTORICAL_TIMEOUT, HistoricalFetcher};
use super::recorder::{LiveRecorder, RecordError, RecordingHandle};
use crate::application::ports::{
    Clock, FeedError, FeedSubscription, LiveFeed, RecordStore, ReplayFeed, StoreError,
};
use crate::domain::event::MarketEvent;
use crate::domain::lookback::{
    DEFAULT_HISTORICAL_LAG, LookbackRequest, ReconciliationResult, ReplayWindow, cutover,
    detect_gaps, merge, trim_to_window,
};
use crate::infrastructure::metrics::{self, JobOutcome};

/// Default time allowed for the recorder to observe cancellation.
pub const DEFAULT_RECORDER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`Reconciler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// How far behind "now" the replay service has data.
    pub historical_lag: TimeDelta,
    /// Upper bound on the replay fetch.
    pub historical_timeout: Duration,
    /// Time allowed for the recorder to stop.
    pub recorder_stop_timeout: Duration,
    /// Ask feeds for disconnect sentinels.
    pub with_disconnect_messages: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            historical_lag: DEFAULT_HISTORICAL_LAG,
            historical_timeout: DEFAULT_HISTORICAL_TIMEOUT,
            recorder_stop_timeout: DEFAULT_RECORDER_STOP_TIMEOUT,
            with_disconnect_messages: false,
        }
    }
}

/// Data gathered while the recorder was running.
struct Collected {
    historical: Vec<MarketEvent>,
    recorded: Vec<MarketEvent>,
    cutover: DateTime<Utc>,
    degraded: bool,
}

/// Runs reconciliation jobs.
pub struct Reconciler {
    recorder: LiveRecorder,
    fetcher: HistoricalFetcher,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Wire a reconciler from its collaborators.
    #[must_use]
    pub fn new(
        live: Arc<dyn LiveFeed>,
        replay: Arc<dyn ReplayFeed>,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            recorder: LiveRecorder::new(live, Arc::clone(&store)),
            fetcher: HistoricalFetcher::new(replay, settings.historical_timeout),
            store,
            clock,
            settings,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Produce the lookback window for `request`.
    ///
    /// The recorder is always stopped before this returns, on success or
    /// failure.
    ///
    /// # Errors
    ///
    /// Any [`ReconcileError`] other than a historical timeout, which is
    /// absorbed by continuing with live data alone.
    #[tracing::instrument(
        name = "reconcile",
        skip_all,
        fields(job_id = %Uuid::new_v4(), exchange = %request.exchange())
    )]
    pub async fn reconcile(
        &self,
        request: &LookbackRequest,
    ) -> Result<ReconciliationResult, ReconcileError> {
        tracing::info!(
            symbols = ?request.symbols(),
            data_types = ?request.data_types(),
            lookback_secs = request.lookback().as_secs(),
            warmup_secs = request.warmup().as_secs(),
            "Reconciliation job started"
        );

        let started = Instant::now();
        let result = self.run(request).await;

        match &result {
            Ok(result) => {
                let outcome = if result.historical_degraded {
                    JobOutcome::Degraded
                } else {
                    JobOutcome::Complete
                };
                metrics::record_reconciliation(outcome, started.elapsed());
                metrics::set_result_events(result.len());
                tracing::info!(
                    events = result.len(),
                    window_start = %result.window_start,
                    window_end = %result.window_end,
                    degraded = result.historical_degraded,
                    "Reconciliation job complete"
                );
            }
            Err(e) => {
                metrics::record_reconciliation(JobOutcome::Failed, started.elapsed());
                tracing::error!(stage = %e.stage(), error = %e, "Reconciliation job failed");
            }
        }

        result
    }

    async fn run(&self, request: &LookbackRequest) -> Result<ReconciliationResult, ReconcileError> {
        let subscription =
            FeedSubscription::for_request(request, self.settings.with_disconnect_messages);

        let handle = self.recorder.start(&subscription).await.map_err(|source| {
            ReconcileError::FeedUnavailable {
                stage: Stage::StartRecording,
                source,
            }
        })?;

        let collected = self.collect(request, &subscription, &handle).await;

        tracing::info!("Stopping live recording");
        let stopped = handle.stop(self.settings.recorder_stop_timeout).await;

        let collected = match (collected, stopped) {
            (Ok(collected), Ok(stats)) => {
                tracing::info!(?stats, "Live recording stopped");
                collected
            }
            // the recorder's own error explains why collection gave up
            (Err(ReconcileError::RecorderFailed { stage, .. }), Err(e)) => {
                return Err(recorder_error(stage, e));
            }
            (Ok(_), Err(e)) => return Err(recorder_error(Stage::StopRecording, e)),
            (Err(e), stopped) => {
                if let Err(stop_error) = stopped {
                    tracing::warn!(error = %stop_error, "Live recorder failed while aborting job");
                }
                return Err(e);
            }
        };

        finish(request, collected)
    }

    async fn collect(
        &self,
        request: &LookbackRequest,
        subscription: &FeedSubscription,
        handle: &RecordingHandle,
    ) -> Result<Collected, ReconcileError> {
        tracing::info!(
            warmup_secs = request.warmup().as_secs(),
            "Warming up live recording"
        );
        tokio::time::sleep(request.warmup()).await;
        ensure_recording(handle, Stage::WarmUp)?;

        let window = ReplayWindow::plan(
            self.clock.now(),
            request.lookback_delta(),
            self.settings.historical_lag,
        );

        let historical = match self.fetcher.fetch(subscription, &window).await {
            Ok(events) => events,
            Err(ReconcileError::HistoricalFetchTimeout { timeout }) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Historical fetch timed out, continuing with live data only"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        ensure_recording(handle, Stage::FetchHistorical)?;

        let actual_hist_end = historical.last().map(|event| event.timestamp);
        let degraded = actual_hist_end.is_none();
        if degraded {
            tracing::warn!("No historical data, live data must cover the whole lookback");
        }
        let cutover = cutover(actual_hist_end, self.clock.now(), request.lookback_delta());

        tracing::info!(%cutover, "Reading recorded live data");
        let store = Arc::clone(&self.store);
        let recorded = tokio::task::spawn_blocking(move || store.query_range(cutover))
            .await
            .unwrap_or_else(|e| Err(StoreError::Unavailable(e.to_string())))
            .map_err(|source| ReconcileError::StorageUnavailable {
                stage: Stage::QueryRecorded,
                source,
            })?;
        tracing::info!(
            count = recorded.len(),
            first = ?recorded.first().map(|event| event.timestamp),
            last = ?recorded.last().map(|event| event.timestamp),
            "Recorded live data read"
        );

        Ok(Collected {
            historical,
            recorded,
            cutover,
            degraded,
        })
    }
}

fn ensure_recording(handle: &RecordingHandle, stage: Stage) -> Result<(), ReconcileError> {
    if handle.is_finished() {
        return Err(ReconcileError::RecorderFailed {
            stage,
            reason: "live recording stopped early".to_string(),
        });
    }
    Ok(())
}

fn recorder_error(stage: Stage, error: RecordError) -> ReconcileError {
    match error {
        RecordError::Feed(source) => ReconcileError::FeedUnavailable { stage, source },
        RecordError::FeedEnded => ReconcileError::FeedUnavailable {
            stage,
            source: FeedError::ConnectionLost("live feed ended".to_string()),
        },
        RecordError::Store(source) => ReconcileError::StorageUnavailable { stage, source },
        RecordError::Task(_) | RecordError::StopTimeout(_) => ReconcileError::RecorderFailed {
            stage,
            reason: error.to_string(),
        },
    }
}

fn finish(
    request: &LookbackRequest,
    collected: Collected,
) -> Result<ReconciliationResult, ReconcileError> {
    let Collected {
        historical,
        recorded,
        cutover,
        degraded,
    } = collected;

    let Some(window_end) = recorded.last().map(|event| event.timestamp) else {
        return Err(ReconcileError::InsufficientData {
            stage: Stage::Trim,
            reason: format!("no recorded live data since {cutover}"),
        });
    };

    let historical_count = historical.len();
    let recorded_count = recorded.len();
    let merged = merge(historical, recorded);
    if merged.reordered {
        tracing::debug!("Merged sequence required sorting");
    }

    let lookback = request.lookback_delta();
    let events = trim_to_window(merged.events, window_end, lookback);
    let gaps = detect_gaps(&events);
    for gap in &gaps {
        tracing::warn!(
            symbol = %gap.symbol,
            name = %gap.name,
            after = %gap.after,
            before = %gap.before,
            missing = gap.missing_samples(),
            "Sampling gap in reconciled window"
        );
    }

    Ok(ReconciliationResult {
        events,
        window_start: window_end - lookback,
        window_end,
        cutover,
        historical_degraded: degraded,
        historical_count,
        recorded_count,
        duplicates_removed: merged.duplicates_removed,
        gaps,
    })
}
