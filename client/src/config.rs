//! Configuration for the Regent client core.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Completion API settings. The credential is not configured here; it is a
/// user preference kept in the session store.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Identity login polling settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Delay between order status queries.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// An order still pending after this long fails as expired.
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,
}

impl IdentityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            order_timeout_secs: default_order_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite:<path>`, a bare path, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    2000
}
fn default_order_timeout() -> u64 {
    180
}
fn default_database_url() -> String {
    "sqlite:./data/regent.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (REGENT__SECTION__KEY format)
    /// 2. regent.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("regent")
    }

    /// Same as [`Config::load`] with an explicit file name (extension optional).
    pub fn load_from(file_name: &str) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("identity.poll_interval_ms", default_poll_interval() as i64)?
            .set_default("identity.order_timeout_secs", default_order_timeout() as i64)?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name(file_name).required(false))
            .add_source(
                Environment::with_prefix("REGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
