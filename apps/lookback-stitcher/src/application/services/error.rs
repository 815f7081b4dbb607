//! Reconciliation errors.

use std::fmt;
use std::time::Duration;

use crate::application::ports::{FeedError, StoreError};

/// Step of a reconciliation job, attached to errors for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Subscribing the live recorder.
    StartRecording,
    /// Waiting for the recorder to accumulate data.
    WarmUp,
    /// Collecting the historical replay.
    FetchHistorical,
    /// Reading recorded live events.
    QueryRecorded,
    /// Cancelling and joining the recorder.
    StopRecording,
    /// Trimming the merged sequence.
    Trim,
}

impl Stage {
    /// Stable label for logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartRecording => "start_recording",
            Self::WarmUp => "warm_up",
            Self::FetchHistorical => "fetch_historical",
            Self::QueryRecorded => "query_recorded",
            Self::StopRecording => "stop_recording",
            Self::Trim => "trim",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// A live or replay subscription could not be established or was lost.
    #[error("feed unavailable during {stage}: {source}")]
    FeedUnavailable {
        /// Failing stage.
        stage: Stage,
        /// Underlying feed error.
        #[source]
        source: FeedError,
    },

    /// The historical replay did not finish in time.
    ///
    /// Absorbed by the reconciler, which continues with live data only.
    #[error("historical fetch timed out after {timeout:?}")]
    HistoricalFetchTimeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// No recorded live data to anchor the window on.
    #[error("insufficient data during {stage}: {reason}")]
    InsufficientData {
        /// Failing stage.
        stage: Stage,
        /// What was missing.
        reason: String,
    },

    /// The record store could not be read or written.
    #[error("record store unavailable during {stage}: {source}")]
    StorageUnavailable {
        /// Failing stage.
        stage: Stage,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The live recorder stopped unexpectedly or could not be joined.
    #[error("live recorder failed during {stage}: {reason}")]
    RecorderFailed {
        /// Failing stage.
        stage: Stage,
        /// Failure description.
        reason: String,
    },
}

impl ReconcileError {
    /// Stage at which the job failed, if known.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::FeedUnavailable { stage, .. }
            | Self::InsufficientData { stage, .. }
            | Self::StorageUnavailable { stage, .. }
            | Self::RecorderFailed { stage, .. } => *stage,
            Self::HistoricalFetchTimeout { .. } => Stage::FetchHistorical,
        }
    }
}
