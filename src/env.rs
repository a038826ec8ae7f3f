//! Environment variable names for configuring a shipper from a service's
//! environment.
//!
//! These are helpers only; [`Shipper`](crate::shipper::Shipper) itself never
//! reads the environment.

use crate::config::Options;
use crate::error::{Result, ShipperError};
use crate::journal::{JournalFormat, JournalOptionsPatch};
use std::path::PathBuf;

/// Collector base URL, e.g. `http://127.0.0.1:3000`.
pub const LOG_SHIPPER_COLLECTOR_URL_ENV: &str = "LOG_SHIPPER_COLLECTOR_URL";

/// Messages per minute; `0` or negative means unlimited.
pub const LOG_SHIPPER_RATE_LIMIT_ENV: &str = "LOG_SHIPPER_RATE_LIMIT";

/// Default delivery target identifier.
pub const LOG_SHIPPER_TARGET_ENV: &str = "LOG_SHIPPER_TARGET";

/// Environment name; `production` starts with `DEBUG` disabled.
pub const LOG_SHIPPER_ENVIRONMENT_ENV: &str = "LOG_SHIPPER_ENVIRONMENT";

/// Journal file path. Setting it enables the journal.
pub const LOG_SHIPPER_JOURNAL_PATH_ENV: &str = "LOG_SHIPPER_JOURNAL_PATH";

/// Journal format: `json`, `csv` or `txt`.
pub const LOG_SHIPPER_JOURNAL_FORMAT_ENV: &str = "LOG_SHIPPER_JOURNAL_FORMAT";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Options {
    /// Build options from whichever `LOG_SHIPPER_*` variables are set.
    pub fn from_env() -> Result<Options> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Options>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut options = Options::new();

        if let Some(url) = get(LOG_SHIPPER_COLLECTOR_URL_ENV) {
            options = options.collector_url(url);
        }
        if let Some(rate) = get(LOG_SHIPPER_RATE_LIMIT_ENV) {
            let rate = rate.trim().parse::<i64>().map_err(|e| {
                ShipperError::config(LOG_SHIPPER_RATE_LIMIT_ENV, format!("'{}': {}", rate, e))
            })?;
            options = options.rate_limit(rate);
        }
        if let Some(target) = get(LOG_SHIPPER_TARGET_ENV) {
            options = options.default_target(target);
        }
        if let Some(environment) = get(LOG_SHIPPER_ENVIRONMENT_ENV) {
            options = options.environment(environment);
        }

        let mut journal = JournalOptionsPatch::default();
        if let Some(path) = get(LOG_SHIPPER_JOURNAL_PATH_ENV) {
            journal.enabled = Some(true);
            journal.path = Some(PathBuf::from(path));
        }
        if let Some(format) = get(LOG_SHIPPER_JOURNAL_FORMAT_ENV) {
            let format = format
                .parse::<JournalFormat>()
                .map_err(|e| ShipperError::config(LOG_SHIPPER_JOURNAL_FORMAT_ENV, e))?;
            journal.format = Some(format);
        }
        if journal != JournalOptionsPatch::default() {
            options = options.journal(journal);
        }
        Ok(options)
    }
}
