use std::{env, str::FromStr, time::Duration};

use crate::domain::Error;

/// Longest accepted idle period, in days. Keeps `now - idle_period` representable.
pub const MAX_IDLE_DAYS: i64 = 36_500;
/// Longest accepted session lifetime, in hours.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

/// Runtime knobs of the ledger, sweep job and session tokens.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Savings untouched for longer than this are swept.
    pub idle_period: chrono::Duration,
    pub sweep_interval: Duration,
    /// Attempts per read-modify-write before giving up with `Conflict`/`StorageUnavailable`.
    pub max_retries: u32,
    pub storage_timeout: Duration,
    pub retry_backoff: Duration,
    pub token_ttl: chrono::Duration,
    /// Required to self-register as an administrator. `None` disables it.
    pub admin_secret: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            idle_period: chrono::Duration::days(30),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
            max_retries: 5,
            storage_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(10),
            token_ttl: chrono::Duration::hours(24),
            admin_secret: None,
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by the process environment and an optional `.env` file.
    pub fn from_env() -> Result<Self, Error> {
        // A missing .env file is fine, the variables may come from the process.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(days) = parse::<i64, _>(&lookup, "LEDGER_IDLE_DAYS")? {
            config.idle_period = bounded(days, MAX_IDLE_DAYS, "LEDGER_IDLE_DAYS", chrono::Duration::try_days)?;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "LEDGER_SWEEP_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(Error::Config("LEDGER_SWEEP_INTERVAL_SECS must be positive".into()));
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(retries) = parse::<u32, _>(&lookup, "LEDGER_MAX_RETRIES")? {
            config.max_retries = retries.max(1);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "LEDGER_STORAGE_TIMEOUT_MS")? {
            config.storage_timeout = Duration::from_millis(ms);
        }
        if let Some(hours) = parse::<i64, _>(&lookup, "LEDGER_TOKEN_TTL_HOURS")? {
            config.token_ttl = bounded(hours, MAX_TOKEN_TTL_HOURS, "LEDGER_TOKEN_TTL_HOURS", chrono::Duration::try_hours)?;
        }
        config.admin_secret = lookup("ADMIN_SECRET").filter(|s| !s.is_empty());

        Ok(config)
    }
}

fn bounded(
    value: i64,
    max: i64,
    key: &str,
    to_duration: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, Error> {
    if !(1..=max).contains(&value) {
        return Err(Error::Config(format!("{key}={value}: must be between 1 and {max}")));
    }
    to_duration(value).ok_or_else(|| Error::Config(format!("{key}={value}: out of range")))
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw}: {e}"))),
    }
}
