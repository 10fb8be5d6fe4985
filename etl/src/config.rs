//! Run settings resolved from the environment.
//!
//! `.env` is loaded first when present. CLI flags override through the
//! `with_*` builders.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::load::DEFAULT_BATCH_SIZE;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BATCH_SIZE: &str = "ETL_BATCH_SIZE";
pub const ENV_LOG_DIR: &str = "ETL_LOG_DIR";
pub const ENV_HTTP_TIMEOUT: &str = "ETL_HTTP_TIMEOUT_SECS";

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// SQLite path or `sqlite://` URL. Only needed for loading runs.
    pub database_url: Option<String>,
    pub batch_size: usize,
    pub log_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        settings.database_url = get(ENV_DATABASE_URL);

        if let Some(raw) = get(ENV_BATCH_SIZE) {
            settings.batch_size = parse_positive(ENV_BATCH_SIZE, &raw)? as usize;
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            settings.log_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_HTTP_TIMEOUT) {
            settings.http_timeout = Duration::from_secs(parse_positive(ENV_HTTP_TIMEOUT, &raw)?);
        }
        Ok(settings)
    }

    pub fn with_database(mut self, url: Option<String>) -> Self {
        if url.is_some() {
            self.database_url = url;
        }
        self
    }

    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Result<Self, ConfigError> {
        if let Some(n) = batch_size {
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "--batch-size",
                    value: n.to_string(),
                    reason: "must be at least 1".into(),
                });
            }
            self.batch_size = n;
        }
        Ok(self)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let n: u64 = raw.trim().parse().map_err(|_| invalid("not a whole number"))?;
    if n == 0 {
        return Err(invalid("must be at least 1"));
    }
    Ok(n)
}
