use dust_common::error::{DustError, DustResult};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    /// Seconds between two periodic sync triggers.
    pub sync_interval_secs: u64,
    pub max_concurrent_workflows: usize,
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> DustResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            parse_var_or("RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            parse_var_or("RETRY_BACKOFF_BASE_MS", defaults.backoff_base_ms)?,
            parse_var_or("RETRY_BACKOFF_CAP_MS", defaults.backoff_cap_ms)?,
        )?;

        let max_concurrent_workflows: usize = parse_var_or("MAX_CONCURRENT_WORKFLOWS", 8)?;
        if max_concurrent_workflows == 0 {
            return Err(DustError::Config(
                "MAX_CONCURRENT_WORKFLOWS must be at least 1".to_owned(),
            ));
        }

        let sync_interval_secs: u64 = parse_var_or("SYNC_INTERVAL_SECS", 300)?;
        if sync_interval_secs == 0 {
            return Err(DustError::Config(
                "SYNC_INTERVAL_SECS must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            log_level: get_var_or("LOG_LEVEL", "info"),
            sync_interval_secs,
            max_concurrent_workflows,
            retry,
        })
    }
}

pub fn get_var(key: &str) -> DustResult<String> {
    env::var(key).map_err(|_| DustError::Config(format!("{key} is required but not set")))
}

pub fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an optional variable, failing loudly when it is set but malformed.
pub fn parse_var_or<T>(key: &str, default: T) -> DustResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DustError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_optional_vars() {
        for key in [
            "RETRY_MAX_ATTEMPTS",
            "RETRY_BACKOFF_BASE_MS",
            "RETRY_BACKOFF_CAP_MS",
            "MAX_CONCURRENT_WORKFLOWS",
            "SYNC_INTERVAL_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn config_from_env_succeeds_with_required_vars() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_optional_vars();

        env::set_var("DATABASE_URL", "postgres://localhost/dust_test");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.database_url, "postgres://localhost/dust_test");
        assert_eq!(cfg.sync_interval_secs, 300);
        assert_eq!(cfg.max_concurrent_workflows, 8);
        assert_eq!(cfg.retry, RetryPolicy::default());

        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn config_from_env_fails_without_database_url() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_optional_vars();

        env::remove_var("DATABASE_URL");
        let result = AppConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn config_reads_retry_policy() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_optional_vars();

        env::set_var("DATABASE_URL", "postgres://localhost/dust_test");
        env::set_var("RETRY_MAX_ATTEMPTS", "3");
        env::set_var("RETRY_BACKOFF_BASE_MS", "250");
        env::set_var("RETRY_BACKOFF_CAP_MS", "4000");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff_base_ms, 250);
        assert_eq!(cfg.retry.backoff_cap_ms, 4000);

        clear_optional_vars();
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn config_rejects_malformed_numbers() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_optional_vars();

        env::set_var("DATABASE_URL", "postgres://localhost/dust_test");
        env::set_var("SYNC_INTERVAL_SECS", "soon");

        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SYNC_INTERVAL_SECS"));

        clear_optional_vars();
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn config_rejects_zero_sync_interval() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_optional_vars();

        env::set_var("DATABASE_URL", "postgres://localhost/dust_test");
        env::set_var("SYNC_INTERVAL_SECS", "0");

        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SYNC_INTERVAL_SECS"));

        clear_optional_vars();
        env::remove_var("DATABASE_URL");
    }
}
