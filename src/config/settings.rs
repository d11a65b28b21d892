use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Api {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Poll cadence and freshness windows, in seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct Polling {
    pub status_idle_secs: u64,
    pub status_running_secs: u64,
    pub logs_idle_secs: u64,
    pub logs_running_secs: u64,
    pub logs_fresh_idle_secs: u64,
    pub logs_fresh_running_secs: u64,
    pub metadata_fresh_secs: u64,
    pub monitor_secs: u64,
    pub retain_secs: u64,
    pub log_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: Api,
    pub polling: Polling,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".into());

        let s = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // APP_API__BASE_URL, APP_POLLING__STATUS_IDLE_SECS, ...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Built-in values only, without files or environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("api.base_url", "http://localhost:5000")?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("polling.status_idle_secs", 30)?
            .set_default("polling.status_running_secs", 5)?
            .set_default("polling.logs_idle_secs", 30)?
            .set_default("polling.logs_running_secs", 10)?
            .set_default("polling.logs_fresh_idle_secs", 60)?
            .set_default("polling.logs_fresh_running_secs", 5)?
            .set_default("polling.metadata_fresh_secs", 60)?
            .set_default("polling.monitor_secs", 5)?
            .set_default("polling.retain_secs", 300)?
            .set_default("polling.log_limit", 100)
    }
}
