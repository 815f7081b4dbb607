//! Lookback Stitcher Binary
//!
//! Runs one lookback job and writes the window as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin lookback-stitcher > window.jsonl
//! ```
//!
//! # Environment Variables
//!
//! ## Feed
//! - `TARDIS_MACHINE_URL`: tardis-machine base URL (default: ws://localhost:8001)
//! - `FEED_WITH_DISCONNECT_MESSAGES`: Request disconnect sentinels (default: false)
//! - `FEED_RECONNECT_DELAY_INITIAL_MS`, `FEED_RECONNECT_DELAY_MAX_SECS`,
//!   `FEED_RECONNECT_DELAY_MULTIPLIER`, `FEED_MAX_RECONNECT_ATTEMPTS`
//!
//! ## Job
//! - `LOOKBACK_EXCHANGE`: Exchange id (default: deribit)
//! - `LOOKBACK_SYMBOLS`: Comma-separated symbols (default: BTC-PERPETUAL)
//! - `LOOKBACK_DATA_TYPES`: Comma-separated data types (default: quote_1m)
//! - `LOOKBACK_SECS`: Window length (default: 86400)
//! - `RECORDING_WARMUP_SECS`: Live recording before the replay (default: 900)
//! - `HISTORICAL_TIMEOUT_SECS`: Replay fetch bound (default: 1800)
//! - `HISTORICAL_LAG_SECS`: Replay availability lag (default: 840)
//! - `RECORDER_STOP_TIMEOUT_SECS`: Recorder stop bound (default: 5)
//!
//! ## Output and storage
//! - `RECORD_STORE_PATH`: SQLite file (default: database.db)
//! - `RECORD_STORE_RESET`: Clear the store on start (default: true)
//! - `LOOKBACK_OUTPUT`: Output file (default: stdout)
//!
//! ## Metrics
//! - `METRICS_PORT`: Serve Prometheus metrics while the job runs (default: off)
//! - `METRICS_SNAPSHOT_PATH`: Write the final metrics here (default: debug log)
//!
//! ## Observability
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter; logs go to stderr

use std::net::SocketAddr;

use anyhow::Context;
use lookback_stitcher::infrastructure::telemetry;
use lookback_stitcher::job::{self, request_from_settings};
use lookback_stitcher::{
    MetricsSettings, StitcherConfig, export_result, init_metrics, serve_metrics, write_snapshot,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Lookback Stitcher");

    let config = StitcherConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let metrics_handle = match config.metrics.port {
        Some(port) => serve_metrics(SocketAddr::from(([0, 0, 0, 0], port)))
            .context("failed to start metrics listener")?,
        None => init_metrics(),
    };

    let request = request_from_settings(&config.job).context("invalid lookback job")?;

    let outcome = tokio::select! {
        result = job::run(&config, &request) => result.context("lookback job failed"),
        reason = await_shutdown() => {
            tracing::warn!(signal = reason, "Job interrupted before completion");
            Err(anyhow::anyhow!("interrupted by {reason}"))
        }
    };

    report_metrics(&metrics_handle, &config.metrics);
    let result = outcome?;

    tracing::info!(
        events = result.len(),
        window_start = %result.window_start,
        window_end = %result.window_end,
        historical_degraded = result.historical_degraded,
        gaps = result.gaps.len(),
        "Lookback window ready"
    );

    export_result(&result, config.output.as_deref()).context("failed to write window")?;

    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &StitcherConfig) {
    tracing::info!(
        exchange = %config.job.exchange,
        symbols = ?config.job.symbols,
        data_types = ?config.job.data_types,
        lookback_secs = config.job.lookback.as_secs(),
        warmup_secs = config.job.warmup.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.feed.base_url,
        store = %config.store.path.display(),
        reset_store = config.store.reset_on_start,
        "Endpoints"
    );
}

/// Write the final metrics to the configured snapshot, or log them.
fn report_metrics(handle: &PrometheusHandle, settings: &MetricsSettings) {
    let Some(path) = &settings.snapshot else {
        tracing::debug!(metrics = %handle.render(), "Final metrics");
        return;
    };

    match write_snapshot(handle, path) {
        Ok(()) => tracing::info!(path = %path.display(), "Metrics snapshot written"),
        Err(e) => tracing::warn!(error = %e, path = %path.display(), "Metrics snapshot failed"),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Resolve when SIGINT or SIGTERM arrives, naming the signal.
async fn await_shutdown() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
