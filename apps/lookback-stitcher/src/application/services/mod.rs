//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `LiveRecorder`: Drains the live feed into the record store
//! - `HistoricalFetcher`: Collects a bounded replay under a timeout
//! - `Reconciler`: Runs the full lookback job

mod error;
mod fetcher;
mod reconciler;
mod recorder;

pub use error::{ReconcileError, Stage};
pub use fetcher::{DEFAULT_HISTORICAL_TIMEOUT, HistoricalFetcher};
pub use reconciler::{DEFAULT_RECORDER_STOP_TIMEOUT, Reconciler, ReconcilerSettings};
pub use recorder::{LiveRecorder, RecordError, RecorderStats, RecordingHandle};
