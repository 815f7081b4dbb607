//! Configuration Module
//!
//! Configuration loading for the lookback job.

mod settings;

pub use settings::{
    ConfigError, FeedSettings, JobSettings, MetricsSettings, StitcherConfig, StoreSettings,
};
