//! Application configuration structs
//!
//! Loads configuration from environment variables and `.env` files.

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub realtime: RealtimeConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Realtime client configuration
///
/// All durations are stored in milliseconds, matching the environment
/// variables they are loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the realtime service
    #[serde(default = "default_url")]
    pub url: String,
    /// Master switch; when false every client operation is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base delay for the first reconnect attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Ceiling for the exponential part of the reconnect delay
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each delay
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,
    /// Maximum number of frames held while disconnected
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long a typing indicator lives without a refresh
    #[serde(default = "default_typing_ttl_ms")]
    pub typing_ttl_ms: u64,
    /// Interval of the typing expiry sweep
    #[serde(default = "default_typing_sweep_ms")]
    pub typing_sweep_ms: u64,
    /// Minimum interval between outbound "typing started" frames
    #[serde(default = "default_typing_throttle_ms")]
    pub typing_throttle_ms: u64,
    /// Maximum number of message ids remembered per circle
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            enabled: default_enabled(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
            queue_capacity: default_queue_capacity(),
            typing_ttl_ms: default_typing_ttl_ms(),
            typing_sweep_ms: default_typing_sweep_ms(),
            typing_throttle_ms: default_typing_throttle_ms(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl RealtimeConfig {
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    #[must_use]
    pub fn backoff_jitter(&self) -> Duration {
        Duration::from_millis(self.backoff_jitter_ms)
    }

    #[must_use]
    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    #[must_use]
    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_ms)
    }

    #[must_use]
    pub fn typing_throttle(&self) -> Duration {
        Duration::from_millis(self.typing_throttle_ms)
    }

    /// Check the relationships between the knobs
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("REALTIME_URL", "must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_QUEUE_CAPACITY",
                "must be at least 1".into(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_DEDUP_CAPACITY",
                "must be at least 1".into(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_BACKOFF_BASE_MS",
                "must be at least 1".into(),
            ));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::InvalidValue(
                "REALTIME_BACKOFF_CAP_MS",
                format!("{} is below the base delay {}", self.backoff_cap_ms, self.backoff_base_ms),
            ));
        }
        if self.typing_sweep_ms == 0 || self.typing_sweep_ms >= self.typing_ttl_ms {
            return Err(ConfigError::InvalidValue(
                "REALTIME_TYPING_SWEEP_MS",
                format!("must be between 1 and the typing TTL ({})", self.typing_ttl_ms),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_app_name() -> String {
    "circle-realtime".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_url() -> String {
    "ws://127.0.0.1:8081/ws".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_backoff_jitter_ms() -> u64 {
    1_000
}

fn default_queue_capacity() -> usize {
    100
}

fn default_typing_ttl_ms() -> u64 {
    6_000
}

fn default_typing_sweep_ms() -> u64 {
    1_000
}

fn default_typing_throttle_ms() -> u64 {
    3_000
}

fn default_dedup_capacity() -> usize {
    500
}

/// Read an optional environment variable, falling back to `default` when unset
fn env_or<T: FromStr>(key: &'static str, default: impl FnOnce() -> T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default()),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but unparseable, or the
    /// resulting realtime settings are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            realtime: RealtimeConfig {
                url: env::var("REALTIME_URL").unwrap_or_else(|_| default_url()),
                enabled: env_or("REALTIME_ENABLED", default_enabled)?,
                backoff_base_ms: env_or("REALTIME_BACKOFF_BASE_MS", default_backoff_base_ms)?,
                backoff_cap_ms: env_or("REALTIME_BACKOFF_CAP_MS", default_backoff_cap_ms)?,
                backoff_jitter_ms: env_or("REALTIME_BACKOFF_JITTER_MS", default_backoff_jitter_ms)?,
                queue_capacity: env_or("REALTIME_QUEUE_CAPACITY", default_queue_capacity)?,
                typing_ttl_ms: env_or("REALTIME_TYPING_TTL_MS", default_typing_ttl_ms)?,
                typing_sweep_ms: env_or("REALTIME_TYPING_SWEEP_MS", default_typing_sweep_ms)?,
                typing_throttle_ms: env_or("REALTIME_TYPING_THROTTLE_MS", default_typing_throttle_ms)?,
                dedup_capacity: env_or("REALTIME_DEDUP_CAPACITY", default_dedup_capacity)?,
            },
        };

        config.realtime.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
