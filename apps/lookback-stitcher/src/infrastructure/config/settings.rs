//! Stitcher Configuration Settings
//!
//! Configuration types for the lookback job, loaded from environment
//! variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// tardis-machine base URL.
    pub base_url: String,
    /// Ask for disconnect sentinels.
    pub with_disconnect_messages: bool,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8001".to_string(),
            with_disconnect_messages: false,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

/// Lookback job parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Exchange identifier.
    pub exchange: String,
    /// Symbols to stitch.
    pub symbols: Vec<String>,
    /// Normalized data types.
    pub data_types: Vec<String>,
    /// Length of the window to produce.
    pub lookback: Duration,
    /// Live recording time before the replay is requested.
    pub warmup: Duration,
    /// Upper bound on the replay fetch.
    pub historical_timeout: Duration,
    /// How far behind "now" the replay service has data.
    pub historical_lag: Duration,
    /// Time allowed for the recorder to stop.
    pub recorder_stop_timeout: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            exchange: "deribit".to_string(),
            symbols: vec!["BTC-PERPETUAL".to_string()],
            data_types: vec!["quote_1m".to_string()],
            lookback: Duration::from_secs(24 * 60 * 60),
            warmup: Duration::from_secs(15 * 60),
            historical_timeout: Duration::from_secs(30 * 60),
            historical_lag: Duration::from_secs(14 * 60),
            recorder_stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// SQLite database file.
    pub path: PathBuf,
    /// Drop previously recorded events when the job starts.
    pub reset_on_start: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("database.db"),
            reset_on_start: true,
        }
    }
}

/// Metrics exposure settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Serve the Prometheus endpoint on this port while the job runs.
    pub port: Option<u16>,
    /// Write the rendered metrics here when the job ends.
    pub snapshot: Option<PathBuf>,
}

/// Complete stitcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StitcherConfig {
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Job parameters.
    pub job: JobSettings,
    /// Record store settings.
    pub store: StoreSettings,
    /// Metrics exposure.
    pub metrics: MetricsSettings,
    /// JSON-lines output file; stdout when unset.
    pub output: Option<PathBuf>,
}

impl StitcherConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but empty or unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but empty or unparseable.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Source(&lookup);
        let feed_defaults = FeedSettings::default();
        let job_defaults = JobSettings::default();
        let store_defaults = StoreSettings::default();

        let feed = FeedSettings {
            base_url: env.string("TARDIS_MACHINE_URL")?.unwrap_or(feed_defaults.base_url),
            with_disconnect_messages: env
                .bool("FEED_WITH_DISCONNECT_MESSAGES")?
                .unwrap_or(feed_defaults.with_disconnect_messages),
            reconnect_delay_initial: env
                .millis("FEED_RECONNECT_DELAY_INITIAL_MS")?
                .unwrap_or(feed_defaults.reconnect_delay_initial),
            reconnect_delay_max: env
                .secs("FEED_RECONNECT_DELAY_MAX_SECS")?
                .unwrap_or(feed_defaults.reconnect_delay_max),
            reconnect_delay_multiplier: env
                .parse("FEED_RECONNECT_DELAY_MULTIPLIER")?
                .unwrap_or(feed_defaults.reconnect_delay_multiplier),
            max_reconnect_attempts: env
                .parse("FEED_MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or(feed_defaults.max_reconnect_attempts),
        };

        let job = JobSettings {
            exchange: env.string("LOOKBACK_EXCHANGE")?.unwrap_or(job_defaults.exchange),
            symbols: env.list("LOOKBACK_SYMBOLS")?.unwrap_or(job_defaults.symbols),
            data_types: env
                .list("LOOKBACK_DATA_TYPES")?
                .unwrap_or(job_defaults.data_types),
            lookback: env.secs("LOOKBACK_SECS")?.unwrap_or(job_defaults.lookback),
            warmup: env
                .secs("RECORDING_WARMUP_SECS")?
                .unwrap_or(job_defaults.warmup),
            historical_timeout: env
                .secs("HISTORICAL_TIMEOUT_SECS")?
                .unwrap_or(job_defaults.historical_timeout),
            historical_lag: env
                .secs("HISTORICAL_LAG_SECS")?
                .unwrap_or(job_defaults.historical_lag),
            recorder_stop_timeout: env
                .secs("RECORDER_STOP_TIMEOUT_SECS")?
                .unwrap_or(job_defaults.recorder_stop_timeout),
        };

        let store = StoreSettings {
            path: env
                .string("RECORD_STORE_PATH")?
                .map_or(store_defaults.path, PathBuf::from),
            reset_on_start: env
                .bool("RECORD_STORE_RESET")?
                .unwrap_or(store_defaults.reset_on_start),
        };

        let metrics = MetricsSettings {
            port: env.parse("METRICS_PORT")?,
            snapshot: env.string("METRICS_SNAPSHOT_PATH")?.map(PathBuf::from),
        };

        let output = env.string("LOOKBACK_OUTPUT")?.map(PathBuf::from);

        Ok(Self {
            feed,
            job,
            store,
            metrics,
            output,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

/// Typed reads over a key lookup. Unset keys yield `Ok(None)`.
struct Source<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Source<'_, F> {
    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match (self.0)(key) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(Some(value.trim().to_string())),
        }
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.string(key)?
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.string(key)?
            .map(|value| match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            })
            .transpose()
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn list(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(raw) = self.string(key)? else {
            return Ok(None);
        };
        let items: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect();
        if items.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(Some(items))
    }
}
