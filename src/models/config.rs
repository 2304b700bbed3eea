//! Application configuration structures.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Polling cadence and change-detection settings
    #[serde(default)]
    pub poll: PollConfig,

    /// HTTP fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Notification delivery behavior
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_concurrent_per_source == 0 {
            return Err(AppError::validation(
                "fetch.max_concurrent_per_source must be > 0",
            ));
        }
        if self.fetch.max_pagination_pages == 0 {
            return Err(AppError::validation(
                "fetch.max_pagination_pages must be > 0",
            ));
        }
        if self.dispatch.max_concurrent_deliveries == 0 {
            return Err(AppError::validation(
                "dispatch.max_concurrent_deliveries must be > 0",
            ));
        }
        if self.poll.default_interval_secs == 0 {
            return Err(AppError::validation("poll.default_interval_secs must be > 0"));
        }
        Ok(())
    }
}

/// Polling cadence and change-detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Default seconds between checks of the same series
    #[serde(default = "defaults::poll_interval")]
    pub default_interval_secs: u64,

    /// Per-source interval overrides, keyed by source key
    #[serde(default)]
    pub intervals: HashMap<String, u64>,

    /// New-chapter count above which a cycle logs a backlog burst
    #[serde(default = "defaults::burst_threshold")]
    pub burst_threshold: usize,

    /// Consecutive parse failures before a source is escalated in the logs
    #[serde(default = "defaults::parse_failure_escalation")]
    pub parse_failure_escalation: u32,
}

impl PollConfig {
    /// Poll interval for a source, honoring per-source overrides.
    pub fn interval_for(&self, source: &str) -> Duration {
        let secs = self
            .intervals
            .get(source)
            .copied()
            .unwrap_or(self.default_interval_secs);
        Duration::from_secs(secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: defaults::poll_interval(),
            intervals: HashMap::new(),
            burst_threshold: defaults::burst_threshold(),
            parse_failure_escalation: defaults::parse_failure_escalation(),
        }
    }
}

/// HTTP client and fetch retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for retryable failures
    #[serde(default = "defaults::max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base delay for exponential backoff, in milliseconds
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Maximum in-flight requests per source
    #[serde(default = "defaults::max_concurrent_per_source")]
    pub max_concurrent_per_source: usize,

    /// Upper bound on chapter-list pages fetched per series
    #[serde(default = "defaults::max_pagination_pages")]
    pub max_pagination_pages: usize,

    /// Seconds a pre-fetch session/cookie handshake stays valid
    #[serde(default = "defaults::session_ttl")]
    pub session_ttl_secs: u64,

    /// External rendering service for anti-bot protected sources
    #[serde(default)]
    pub render_service_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retry_attempts: defaults::max_retry_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            max_concurrent_per_source: defaults::max_concurrent_per_source(),
            max_pagination_pages: defaults::max_pagination_pages(),
            session_ttl_secs: defaults::session_ttl(),
            render_service_url: None,
        }
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum concurrent endpoint deliveries per event
    #[serde(default = "defaults::max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// Maximum retry attempts per endpoint delivery
    #[serde(default = "defaults::max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base delay for delivery backoff, in milliseconds
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Message template for chapter announcements
    #[serde(default = "defaults::message_template")]
    pub message_template: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deliveries: defaults::max_concurrent_deliveries(),
            max_retry_attempts: defaults::max_retry_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            message_template: defaults::message_template(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the watchlist file lives in
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter: debug, info, warn, error
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; mangawatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn poll_interval() -> u64 {
        3600
    }
    pub fn burst_threshold() -> usize {
        20
    }
    pub fn parse_failure_escalation() -> u32 {
        3
    }
    pub fn max_retry_attempts() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        500
    }
    pub fn max_concurrent_per_source() -> usize {
        3
    }
    pub fn max_pagination_pages() -> usize {
        10
    }
    pub fn session_ttl() -> u64 {
        300
    }
    pub fn max_concurrent_deliveries() -> usize {
        5
    }
    pub fn message_template() -> String {
        "**{title}** **{chapter}** has been released!\n{url}".into()
    }
    pub fn data_dir() -> String {
        "data".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
