//! Configuration loading.
//!
//! Defaults are layered under an optional `config/settings.*` file and
//! `TABULA__`-prefixed environment variables (`TABULA__SERVER__LISTEN_ADDR`,
//! `TABULA__REMOTE__MODEL`, …). Remote credentials are deliberately not part
//! of this tree; the client reads `OPENAI_API_KEY` at construction.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use tabula_server::ServerConfig;
use thiserror::Error;

use crate::constants::{
    DEFAULT_COMPLETION_MODEL, DEFAULT_CONTAINER_EXPIRATION_DAYS, DEFAULT_CONTAINER_TIMEOUT_SECS,
    DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REMOTE_BASE_URL, MAX_UPLOAD_BYTES,
};

const CONFIG_FILE: &str = "config/settings";
const ENV_PREFIX: &str = "TABULA";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub container_expiration_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub job_timeout_secs: u64,
    pub container_timeout_secs: u64,
    pub interval_ms: u64,
}

impl PollingConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn container_timeout(&self) -> Duration {
        Duration::from_secs(self.container_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let builder = Config::builder()
        .set_default("server.listen_addr", "127.0.0.1:8080")?
        .set_default("server.max_upload_bytes", MAX_UPLOAD_BYTES as i64)?
        .set_default("remote.base_url", DEFAULT_REMOTE_BASE_URL)?
        .set_default("remote.model", DEFAULT_COMPLETION_MODEL)?
        .set_default(
            "remote.container_expiration_days",
            i64::from(DEFAULT_CONTAINER_EXPIRATION_DAYS),
        )?
        .set_default("polling.job_timeout_secs", DEFAULT_JOB_TIMEOUT_SECS as i64)?
        .set_default(
            "polling.container_timeout_secs",
            DEFAULT_CONTAINER_TIMEOUT_SECS as i64,
        )?
        .set_default("polling.interval_ms", DEFAULT_POLL_INTERVAL_MS as i64)?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}
