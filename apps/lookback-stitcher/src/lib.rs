#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )
)]

//! Lookback Stitcher - Gap-free Market Data Window
//!
//! Produces an exact lookback window of normalized market data ending at the
//! moment a job finishes. Historical data comes from a tardis-machine replay,
//! which lags real time; the most recent stretch comes from a live stream
//! recorded into a local store while the replay runs.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Market events and window arithmetic
//!   - `event`: Normalized book snapshots and the alignment filter
//!   - `lookback`: Requests, replay planning, cutover, merge, trim, gaps
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Live/replay feeds, record store, clock
//!   - `services`: Live recorder, historical fetcher, reconciler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tardis`: WebSocket clients for `ws-stream-normalized` and
//!     `ws-replay-normalized`
//!   - `store`: SQLite record store
//!   - `config`: Environment configuration
//!   - `export`: JSON-lines output
//!   - `metrics` / `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! live stream ──► LiveRecorder ──► record store ──┐
//!                                                 ├──► merge ──► trim ──► window
//! replay ───────► HistoricalFetcher ──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market events and window logic with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Wiring of one lookback job from configuration.
pub mod job;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::{BookLevels, EventKey, MarketEvent, PriceLevel, is_aligned};
pub use domain::lookback::{
    LookbackRequest, ReconciliationResult, ReplayWindow, RequestError, SamplingGap, cutover,
    detect_gaps, merge, trim_to_window,
};

// Ports and services
pub use application::ports::{
    AnchoredClock, Clock, FeedError, FeedMessage, FeedStream, FeedSubscription, LiveFeed,
    RecordStore, ReplayFeed, StoreError, SystemClock,
};
pub use application::services::{
    HistoricalFetcher, LiveRecorder, ReconcileError, Reconciler, ReconcilerSettings,
    RecorderStats, Stage,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, MetricsSettings, StitcherConfig};

// Adapters
pub use infrastructure::export::{ExportError, JsonLinesWriter, export_result};
pub use infrastructure::store::SqliteRecordStore;
pub use infrastructure::tardis::{TardisClientConfig, TardisMachineClient};

// Metrics
pub use infrastructure::metrics::{
    MetricsError, get_metrics_handle, init_metrics, serve_metrics, write_snapshot,
};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

// Job
pub use job::JobError;
