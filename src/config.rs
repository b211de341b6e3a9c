use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub board: BoardConfig,
    pub alerts: AlertConfig,
    pub orders: OrdersConfig,
    pub logging: LoggingConfig,
}

/// Feed endpoint and reconnection policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Full websocket url of the snapshot feed.
    pub url: String,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_ms: u64,
    /// Growth factor applied to the delay after each failed attempt (1.0 = fixed).
    pub backoff_multiplier: f64,
    /// Upper bound for the grown delay.
    pub max_delay_ms: u64,
    /// Consecutive failures tolerated before the connection is abandoned.
    pub max_retries: u32,
    /// Capacity of the feed → event loop channel.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7777/ff_cache".into(),
            reconnect_delay_ms: 2000,
            backoff_multiplier: 1.0,
            max_delay_ms: 30_000,
            max_retries: 100,
            channel_capacity: 256,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Reconciliation and reorder policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Minimum time between two resorts of the visible order.
    pub resort_interval_ms: u64,
    /// Gap in seconds-to-start a market must exceed to overtake its neighbour.
    pub swap_threshold_secs: f64,
    /// Consecutive frames a market may be missing before eviction (0 = never).
    pub evict_after_missed_frames: u32,
    /// Samples kept per entity for derived averages and ranges (0 = off).
    pub history_window: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            resort_interval_ms: 2000,
            swap_threshold_secs: 30.0,
            evict_after_missed_frames: 30,
            history_window: 1000,
        }
    }
}

/// Overrun alert thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub dwell_ms: u64,
    /// Highlight when the lay overrun rises above this.
    pub lay_trigger: f64,
    /// Highlight when the back overrun drops below this.
    pub back_trigger: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1000,
            lay_trigger: 1.0,
            back_trigger: 1.0,
        }
    }
}

/// Open-orders collaborator. Disabled when `api_url` is unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    pub api_url: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&contents)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.reconnect_delay_ms == 0 {
            return Err(invalid("feed.reconnect_delay_ms", "must be positive"));
        }
        if !(self.feed.backoff_multiplier >= 1.0) {
            return Err(invalid("feed.backoff_multiplier", "must be at least 1.0"));
        }
        if self.feed.max_retries == 0 {
            return Err(invalid("feed.max_retries", "must be positive"));
        }
        if self.feed.channel_capacity == 0 {
            return Err(invalid("feed.channel_capacity", "must be positive"));
        }
        if self.board.resort_interval_ms == 0 {
            return Err(invalid("board.resort_interval_ms", "must be positive"));
        }
        if !(self.board.swap_threshold_secs >= 0.0) {
            return Err(invalid("board.swap_threshold_secs", "must not be negative"));
        }
        if self.alerts.dwell_ms == 0 {
            return Err(invalid("alerts.dwell_ms", "must be positive"));
        }
        if self.orders.poll_interval_ms == 0 {
            return Err(invalid("orders.poll_interval_ms", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
