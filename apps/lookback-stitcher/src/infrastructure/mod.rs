//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Tardis machine WebSocket feed adapters (live stream and replay).
pub mod tardis;

/// SQLite record store.
pub mod store;

/// Configuration from environment variables.
pub mod config;

/// JSON-lines export of reconciled windows.
pub mod export;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
