#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_STORAGE_DIR: &str = ".rewardhub";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be an integer (milliseconds), got {value:?}")]
    InvalidMillis { var: &'static str, value: String },
    #[error("api base must start with http:// or https://, got {0:?}")]
    InvalidApiBase(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    /// `None` keeps an unresolved confirmation optimistic indefinitely.
    pub confirm_timeout: Option<Duration>,
    pub storage_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            confirm_timeout: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_var)
    }

    /// Builds a config from `RH_*` variables resolved through `lookup`. Blank values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(base) = lookup("RH_API_BASE") {
            cfg.set_api_base(&base)?;
        }
        cfg.api_token = lookup("RH_API_TOKEN");
        if let Some(raw) = lookup("RH_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = parse_millis("RH_REQUEST_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("RH_CONFIRM_TIMEOUT_MS") {
            cfg.confirm_timeout = Some(parse_millis("RH_CONFIRM_TIMEOUT_MS", &raw)?);
        }
        if let Some(dir) = lookup("RH_STORAGE_DIR") {
            cfg.storage_dir = PathBuf::from(dir);
        }
        Ok(cfg)
    }

    pub fn set_api_base(&mut self, raw: &str) -> Result<(), ConfigError> {
        let base = raw.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidApiBase(raw.to_string()));
        }
        self.api_base = base.to_string();
        Ok(())
    }
}

pub fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis {
            var,
            value: raw.to_string(),
        })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
