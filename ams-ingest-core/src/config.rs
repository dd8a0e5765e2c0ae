use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::batch::{DEFAULT_MAX_BATCH_BYTES, MAX_BATCH_RECORDS};
use crate::{Error, Result};

pub const ENV_INGEST_URL: &str = "AMS_INGEST_URL";
pub const ENV_INGEST_SECRET: &str = "AMS_INGEST_SECRET";
pub const ENV_MAX_ATTEMPTS: &str = "AMS_MAX_ATTEMPTS";
pub const ENV_BASE_BACKOFF_MS: &str = "AMS_BASE_BACKOFF_MS";
pub const ENV_MAX_BACKOFF_MS: &str = "AMS_MAX_BACKOFF_MS";
pub const ENV_BATCH_SIZE: &str = "AMS_BATCH_SIZE";
pub const ENV_MAX_BATCH_BYTES: &str = "AMS_MAX_BATCH_BYTES";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "AMS_REQUEST_TIMEOUT_MS";
pub const ENV_REPORT_BATCH_ITEM_FAILURES: &str = "AMS_REPORT_BATCH_ITEM_FAILURES";

const DEFAULT_MAX_ATTEMPTS: u16 = 3;
const DEFAULT_BASE_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Shared HMAC secret. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = if self.0.len() > 8 {
            let tail: String = self.0.chars().skip(self.0.chars().count() - 2).collect();
            format!("***{tail}")
        } else {
            "*****".to_owned()
        };
        write!(f, "SigningSecret({printable})")
    }
}

/// Delivery attempts per batch and the cool-off between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u16,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_records: usize,
    /// `None` disables the byte ceiling.
    pub max_bytes: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: MAX_BATCH_RECORDS,
            max_bytes: Some(DEFAULT_MAX_BATCH_BYTES),
        }
    }
}

/// Worker configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ingest_url: Url,
    pub signing_secret: SigningSecret,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    /// Upper bound for a single HTTP attempt.
    pub request_timeout: Duration,
    /// Answer with per-message failures instead of failing the whole invocation.
    pub report_batch_item_failures: bool,
}

impl Settings {
    /// Settings with defaults for everything but the endpoint and the secret.
    pub fn new(ingest_url: Url, signing_secret: SigningSecret) -> Self {
        Self {
            ingest_url,
            signing_secret,
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            report_batch_item_failures: false,
        }
    }

    /// Loads the settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        vars.try_into()
    }
}

/// This implementation is to load settings from env variables
impl TryFrom<HashMap<String, String>> for Settings {
    type Error = Error;

    fn try_from(env_vars: HashMap<String, String>) -> Result<Self> {
        let raw_url = required(&env_vars, ENV_INGEST_URL)?;
        let ingest_url = Url::parse(raw_url)
            .map_err(|e| Error::Config(format!("{ENV_INGEST_URL} is not a valid URL: {e}")))?;
        if !matches!(ingest_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "{ENV_INGEST_URL} must be an http(s) URL, got scheme {}",
                ingest_url.scheme()
            )));
        }

        let secret = required(&env_vars, ENV_INGEST_SECRET)?;
        let mut settings = Settings::new(ingest_url, SigningSecret::new(secret));

        if let Some(attempts) = optional::<u16>(&env_vars, ENV_MAX_ATTEMPTS)? {
            if attempts == 0 {
                return Err(Error::Config(format!("{ENV_MAX_ATTEMPTS} must be at least 1")));
            }
            settings.retry.max_attempts = attempts;
        }
        if let Some(ms) = optional::<u64>(&env_vars, ENV_BASE_BACKOFF_MS)? {
            settings.retry.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = optional::<u64>(&env_vars, ENV_MAX_BACKOFF_MS)? {
            settings.retry.max_backoff = Duration::from_millis(ms);
        }
        if settings.retry.max_backoff < settings.retry.base_backoff {
            return Err(Error::Config(format!(
                "{ENV_MAX_BACKOFF_MS} must not be smaller than {ENV_BASE_BACKOFF_MS}"
            )));
        }

        if let Some(size) = optional::<usize>(&env_vars, ENV_BATCH_SIZE)? {
            if !(1..=MAX_BATCH_RECORDS).contains(&size) {
                return Err(Error::Config(format!(
                    "{ENV_BATCH_SIZE} must be between 1 and {MAX_BATCH_RECORDS}, got {size}"
                )));
            }
            settings.batch.max_records = size;
        }
        if let Some(bytes) = optional::<usize>(&env_vars, ENV_MAX_BATCH_BYTES)? {
            settings.batch.max_bytes = (bytes > 0).then_some(bytes);
        }

        if let Some(ms) = optional::<u64>(&env_vars, ENV_REQUEST_TIMEOUT_MS)? {
            if ms == 0 {
                return Err(Error::Config(format!(
                    "{ENV_REQUEST_TIMEOUT_MS} must be greater than 0"
                )));
            }
            settings.request_timeout = Duration::from_millis(ms);
        }

        if let Some(flag) = env_vars.get(ENV_REPORT_BATCH_ITEM_FAILURES) {
            settings.report_batch_item_failures = parse_bool(ENV_REPORT_BATCH_ITEM_FAILURES, flag)?;
        }

        Ok(settings)
    }
}

fn required<'a>(env_vars: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    match env_vars.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config(format!(
            "Environment variable {key} is not set"
        ))),
    }
}

fn optional<T>(env_vars: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = env_vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| Error::Config(format!("parsing {key}: {e} (got {raw:?})")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "parsing {key}: expected true or false, got {other:?}"
        ))),
    }
}
