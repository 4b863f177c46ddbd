use std::time::Duration;

use serde::Deserialize;

use warden_core::config::Config;
use warden_core::tracing::{LogFormat, init_tracing};

/// Identity store configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Connection URL. Env var: `DATABASE_URL`.
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    /// How long a caller waits to check a connection out of the pool.
    #[serde(default = "default_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    /// Log every SQL statement through sqlx.
    #[serde(default)]
    pub db_sqlx_logging: bool,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config for StoreConfig {}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl StoreConfig {
    /// Defaults for everything but the URL.
    pub fn for_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: default_max_connections(),
            db_min_connections: default_min_connections(),
            db_connect_timeout_secs: default_timeout_secs(),
            db_acquire_timeout_secs: default_timeout_secs(),
            db_idle_timeout_secs: default_idle_timeout_secs(),
            db_sqlx_logging: false,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }

    /// Install the stdout subscriber configured by `LOG_FORMAT`/`LOG_LEVEL`.
    pub fn init_tracing(&self) {
        init_tracing(self.log_format, &self.log_level);
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.db_connect_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.db_idle_timeout_secs)
    }
}
