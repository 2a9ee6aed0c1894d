use std::time::Duration;

use crate::backend::BackoffConfig;
use crate::error::{GenerationError, Result};

/// Environment variable overriding [`GeneratorConfig::retry`]'s retry count.
pub const ENV_MAX_RETRIES: &str = "ARTIFACT_FORGE_MAX_RETRIES";
/// Environment variable overriding the per-attempt timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "ARTIFACT_FORGE_TIMEOUT_SECS";
/// Environment variable overriding the delay between attempts, in milliseconds.
pub const ENV_RETRY_DELAY_MS: &str = "ARTIFACT_FORGE_RETRY_DELAY_MS";

/// Tuning knobs for one generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Retries of the generation request and the delay between them.
    pub retry: BackoffConfig,

    /// Partial content longer than this many characters is used as the
    /// result when every attempt fails.
    pub partial_threshold: usize,

    /// Upper bound on one attempt, request plus stream.
    pub attempt_timeout: Duration,

    /// Retries of token-usage reconciliation.
    pub tracking: BackoffConfig,

    /// Thinking budget for models that request a thinking block.
    pub thinking_budget: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            retry: BackoffConfig::generation(),
            partial_threshold: 500,
            attempt_timeout: Duration::from_secs(300),
            tracking: BackoffConfig::tracking(),
            thinking_budget: 10_000,
        }
    }
}

impl GeneratorConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_retry(mut self, retry: BackoffConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_partial_threshold(mut self, chars: usize) -> Self {
        self.partial_threshold = chars;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_tracking(mut self, tracking: BackoffConfig) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn with_thinking_budget(mut self, tokens: u32) -> Self {
        self.thinking_budget = tokens;
        self
    }

    /// Defaults overridden by `ARTIFACT_FORGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Absent values keep the default. Values that do not parse are an
    /// [`GenerationError::InvalidConfig`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(retries) = parse_var::<u32>(&lookup, ENV_MAX_RETRIES)? {
            config.retry.max_retries = retries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_TIMEOUT_SECS)? {
            if secs == 0 {
                return Err(GenerationError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    ENV_TIMEOUT_SECS
                )));
            }
            config.attempt_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_DELAY_MS)? {
            let delay = Duration::from_millis(ms);
            config.retry.initial_delay = delay;
            config.retry.max_delay = delay;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            GenerationError::InvalidConfig(format!("{} has invalid value '{}'", key, raw))
        }),
    }
}
