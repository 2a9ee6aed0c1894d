//! Retry delays for generation attempts and token-usage reconciliation.
//!
//! [`BackoffConfig`] controls how many times a failed step is re-run and how
//! long to wait in between. Generation uses a fixed delay
//! ([`BackoffConfig::generation()`]); token tracking waits a little longer on
//! each attempt ([`BackoffConfig::tracking()`]).

use std::time::Duration;

/// Retry count and delay schedule.
///
/// # Example
///
/// ```
/// use artifact_forge::backend::BackoffConfig;
///
/// let generation = BackoffConfig::generation();
/// assert_eq!(generation.max_retries, 2);
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    /// `1.0` gives a fixed delay.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// Whether a provider `Retry-After` hint overrides the computed delay.
    pub respect_retry_after: bool,
}

/// Jitter strategy to spread retries from many clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::generation()
        }
    }

    /// Generation attempts: 2 retries, fixed 2 s apart.
    pub fn generation() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(2000),
            multiplier: 1.0,
            max_delay: Duration::from_millis(2000),
            jitter: JitterStrategy::None,
            respect_retry_after: true,
        }
    }

    /// Token-usage reconciliation: 3 attempts total, 500 ms then doubling.
    pub fn tracking() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: JitterStrategy::None,
            respect_retry_after: false,
        }
    }

    /// Zero delays, same retry count. Handy in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: JitterStrategy::None,
            respect_retry_after: false,
        }
    }

    /// Total attempts including the first one.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Calculate the delay before retry N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }

    /// Delay before retry N, honoring a provider `Retry-After` hint.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint,
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::generation()
    }
}
