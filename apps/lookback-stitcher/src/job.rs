//! Lookback Job Wiring
//!
//! Builds the concrete adapters from configuration and runs one
//! reconciliation.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::application::ports::{AnchoredClock, LiveFeed, StoreError};
use crate::application::services::{ReconcileError, Reconciler, ReconcilerSettings};
use crate::domain::lookback::{LookbackRequest, ReconciliationResult, RequestError};
use crate::infrastructure::config::{JobSettings, StitcherConfig};
use crate::infrastructure::store::SqliteRecordStore;
use crate::infrastructure::tardis::{ReconnectConfig, TardisClientConfig, TardisMachineClient};

/// Errors that end a job before or during reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Job settings do not form a valid request.
    #[error("invalid lookback request: {0}")]
    Request(#[from] RequestError),
    /// Historical lag does not fit a calendar offset.
    #[error("historical lag of {0:?} is out of range")]
    LagOutOfRange(std::time::Duration),
    /// Record store could not be opened or reset.
    #[error("record store setup failed: {0}")]
    Store(#[from] StoreError),
    /// Reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Build a request from job settings.
///
/// # Errors
///
/// Returns an error if the settings fail request validation.
pub fn request_from_settings(job: &JobSettings) -> Result<LookbackRequest, RequestError> {
    LookbackRequest::new(
        job.exchange.as_str(),
        job.symbols.iter().map(String::as_str),
        job.data_types.iter().map(String::as_str),
        job.lookback,
        job.warmup,
    )
}

/// Reconciler tunables from configuration.
///
/// # Errors
///
/// Returns an error if the historical lag cannot be represented.
pub fn reconciler_settings(config: &StitcherConfig) -> Result<ReconcilerSettings, JobError> {
    let historical_lag = TimeDelta::from_std(config.job.historical_lag)
        .map_err(|_| JobError::LagOutOfRange(config.job.historical_lag))?;

    Ok(ReconcilerSettings {
        historical_lag,
        historical_timeout: config.job.historical_timeout,
        recorder_stop_timeout: config.job.recorder_stop_timeout,
        with_disconnect_messages: config.feed.with_disconnect_messages,
    })
}

/// Open the record store, resetting it when configured.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or cleared.
pub fn open_store(config: &StitcherConfig) -> Result<SqliteRecordStore, StoreError> {
    let store = SqliteRecordStore::open(&config.store.path)?;
    if config.store.reset_on_start {
        store.reset()?;
        tracing::info!(path = %config.store.path.display(), "Record store reset");
    }
    Ok(store)
}

/// Run one lookback job against a tardis-machine server.
///
/// # Errors
///
/// Returns an error if setup fails or reconciliation fails.
pub async fn run(
    config: &StitcherConfig,
    request: &LookbackRequest,
) -> Result<ReconciliationResult, JobError> {
    let settings = reconciler_settings(config)?;
    let store = Arc::new(open_store(config)?);

    let client = Arc::new(TardisMachineClient::new(
        TardisClientConfig::new(config.feed.base_url.as_str())
            .with_reconnect(ReconnectConfig::from_settings(&config.feed)),
    ));

    tracing::debug!(
        base_url = %config.feed.base_url,
        store = %config.store.path.display(),
        historical_timeout_secs = settings.historical_timeout.as_secs(),
        historical_lag_secs = settings.historical_lag.num_seconds(),
        "Job wired"
    );

    let live: Arc<dyn LiveFeed> = client.clone();
    let reconciler = Reconciler::new(
        live,
        client,
        store,
        Arc::new(AnchoredClock::new()),
        settings,
    );

    Ok(reconciler.reconcile(request).await?)
}
