//! Sync client configuration resolved from the environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::is_http_url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the sync engine needs to talk to the server and pace itself
#[derive(Clone, PartialEq, Eq)]
pub struct SyncClientConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    /// Pause after a successful cycle before the next trigger is honored
    pub cooldown: Duration,
    /// Upper bound of the exponential error cool-down
    pub backoff_max: Duration,
    /// Periodic sync tick; `None` disables it
    pub sync_interval: Option<Duration>,
}

impl fmt::Debug for SyncClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("cooldown", &self.cooldown)
            .field("backoff_max", &self.backoff_max)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

impl SyncClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1_500);
    pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(300);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Config with defaults for everything but the server address
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: trim_trailing(api_base_url.into().trim()).to_string(),
            api_token: None,
            request_timeout: Self::DEFAULT_TIMEOUT,
            cooldown: Self::DEFAULT_COOLDOWN,
            backoff_max: Self::DEFAULT_BACKOFF_MAX,
            sync_interval: Some(Self::DEFAULT_INTERVAL),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = required_trimmed(&lookup, "WANDER_API_BASE_URL")?;
        if !is_http_url(&api_base_url) {
            return Err(ConfigError::Invalid(
                "WANDER_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let api_token = optional_trimmed(&lookup, "WANDER_API_TOKEN");

        let timeout_secs = parse_u64(&lookup, "WANDER_SYNC_TIMEOUT_SECS", 30)?;
        if !(1..=600).contains(&timeout_secs) {
            return Err(ConfigError::Invalid(
                "WANDER_SYNC_TIMEOUT_SECS must be in [1, 600]".to_string(),
            ));
        }

        let cooldown_ms = parse_u64(&lookup, "WANDER_SYNC_COOLDOWN_MS", 1_500)?;
        if cooldown_ms > 60_000 {
            return Err(ConfigError::Invalid(
                "WANDER_SYNC_COOLDOWN_MS must be in [0, 60000]".to_string(),
            ));
        }

        let backoff_max_secs = parse_u64(&lookup, "WANDER_SYNC_BACKOFF_MAX_SECS", 300)?;
        if !(1..=86_400).contains(&backoff_max_secs) {
            return Err(ConfigError::Invalid(
                "WANDER_SYNC_BACKOFF_MAX_SECS must be in [1, 86400]".to_string(),
            ));
        }

        let interval_secs = parse_u64(&lookup, "WANDER_SYNC_INTERVAL_SECS", 60)?;

        Ok(Self {
            api_base_url: trim_trailing(&api_base_url).to_string(),
            api_token,
            request_timeout: Duration::from_secs(timeout_secs),
            cooldown: Duration::from_millis(cooldown_ms),
            backoff_max: Duration::from_secs(backoff_max_secs),
            sync_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        })
    }
}

/// Local database location from `WANDER_DB_PATH`, if set
pub fn database_path_from_env() -> Option<PathBuf> {
    database_path_from_lookup(|name| env::var(name).ok())
}

pub fn database_path_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    optional_trimmed(lookup, "WANDER_DB_PATH").map(PathBuf::from)
}

fn parse_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match optional_trimmed(lookup, name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer"))),
        None => Ok(default),
    }
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
