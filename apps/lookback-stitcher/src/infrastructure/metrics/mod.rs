//! Prometheus Metrics Module
//!
//! Counters and histograms for the recording and reconciliation pipeline.
//!
//! # Metrics Categories
//!
//! - **Live**: events received, recorded and skipped by the recorder
//! - **Historical**: replay events fetched and fetch timeouts
//! - **Feed**: reconnect attempts and disconnect sentinels
//! - **Jobs**: reconciliation outcome, duration and result size
//!
//! The recorder is a no-op until [`init_metrics`] or [`serve_metrics`]
//! installs the exporter. A job is short-lived, so besides the optional
//! scrape endpoint the final counters can be written out with
//! [`write_snapshot`].

use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Metrics exporter failures.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    /// A global recorder is already installed.
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,

    /// The snapshot could not be written.
    #[error("failed to write metrics snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the Prometheus recorder and serve it over HTTP on `addr`.
///
/// Must be called from within a Tokio runtime; the listener runs as a
/// background task for the life of the runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the exporter
/// cannot be built.
pub fn serve_metrics(addr: SocketAddr) -> Result<PrometheusHandle, MetricsError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInstalled);
    }

    let (recorder, exporter) = PrometheusBuilder::new().with_http_listener(addr).build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Metrics listener stopped");
        }
    });

    register_metrics();
    let handle = PROMETHEUS_HANDLE.get_or_init(|| handle).clone();
    tracing::info!(%addr, "Serving Prometheus metrics");
    Ok(handle)
}

/// Render the current metrics to `path` in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<(), MetricsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    handle.run_upkeep();
    std::fs::write(path, handle.render())?;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Live recording
    describe_counter!(
        "lookback_live_events_received_total",
        "Total events received from the live feed"
    );
    describe_counter!(
        "lookback_live_events_recorded_total",
        "Total live events written to the record store"
    );
    describe_counter!(
        "lookback_live_events_skipped_total",
        "Total live events not written, by reason"
    );

    // Feed health
    describe_counter!(
        "lookback_feed_disconnects_total",
        "Total upstream disconnect sentinels received"
    );
    describe_counter!(
        "lookback_feed_reconnects_total",
        "Total live feed reconnection attempts"
    );

    // Historical replay
    describe_counter!(
        "lookback_historical_events_total",
        "Total events received from historical replays"
    );
    describe_counter!(
        "lookback_historical_timeouts_total",
        "Total historical fetches abandoned after the timeout"
    );

    // Jobs
    describe_counter!(
        "lookback_reconciliations_total",
        "Total reconciliation jobs by outcome"
    );
    describe_histogram!(
        "lookback_reconciliation_seconds",
        "Wall time of a reconciliation job"
    );
    describe_gauge!(
        "lookback_result_events",
        "Number of events in the last reconciled window"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reasons a live event is not written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Timestamp not on the sampling grid.
    Misaligned,
    /// Identity already stored.
    Duplicate,
}

impl SkipReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Misaligned => "misaligned",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Reconciliation outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Both sources contributed.
    Complete,
    /// Historical data was unavailable; live data alone.
    Degraded,
    /// The job failed.
    Failed,
}

impl JobOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

/// Record an event received from the live feed.
pub fn record_live_received() {
    counter!("lookback_live_events_received_total").increment(1);
}

/// Record a live event written to the store.
pub fn record_live_recorded() {
    counter!("lookback_live_events_recorded_total").increment(1);
}

/// Record a live event that was not written.
pub fn record_live_skipped(reason: SkipReason) {
    counter!(
        "lookback_live_events_skipped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an upstream disconnect sentinel.
pub fn record_disconnect(exchange: &str) {
    counter!(
        "lookback_feed_disconnects_total",
        "exchange" => exchange.to_string()
    )
    .increment(1);
}

/// Record a live feed reconnection attempt.
pub fn record_reconnect() {
    counter!("lookback_feed_reconnects_total").increment(1);
}

/// Record events received from a historical replay.
pub fn record_historical_events(count: u64) {
    counter!("lookback_historical_events_total").increment(count);
}

/// Record a historical fetch timeout.
pub fn record_historical_timeout() {
    counter!("lookback_historical_timeouts_total").increment(1);
}

/// Record the outcome and duration of a reconciliation.
pub fn record_reconciliation(outcome: JobOutcome, duration: Duration) {
    counter!(
        "lookback_reconciliations_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "lookback_reconciliation_seconds",
        "outcome" => outcome.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Update the size of the last reconciled window.
#[allow(clippy::cast_precision_loss)]
pub fn set_result_events(count: usize) {
    gauge!("lookback_result_events").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
