//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL may carry credentials, so it is held as a
//! `SecretString`.

pub mod secrets;

use std::time::Duration;

use crate::db::RetryPolicy;
use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub storage_max_attempts: u32,
    pub storage_retry_base: Duration,
    pub storage_retry_max: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })?;

        let storage_max_attempts = parse_var(&lookup, "STORAGE_MAX_ATTEMPTS", 5u32)?;
        if storage_max_attempts == 0 {
            return Err(Error::Config(
                "STORAGE_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: SecretString::from(database_url),
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            storage_max_attempts,
            storage_retry_base: Duration::from_millis(parse_var(
                &lookup,
                "STORAGE_RETRY_BASE_MS",
                25u64,
            )?),
            storage_retry_max: Duration::from_millis(parse_var(
                &lookup,
                "STORAGE_RETRY_MAX_MS",
                1000u64,
            )?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.storage_max_attempts,
            base_delay: self.storage_retry_base,
            max_delay: self.storage_retry_max,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw:?}"))),
    }
}
