//! # Backoff Policy Module
//!
//! Capped exponential backoff used by the consumer loop between idle or failed
//! polls and between acknowledgement retries.
//!
//! Jitter spreads concurrent loops apart so they do not hammer a recovering
//! provider in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy configuration
///
/// # Examples
///
/// ```rust
/// use queue_adapter::retry::BackoffPolicy;
/// use std::time::Duration;
///
/// // Default policy: 100ms initial, 10s max, 2.0x multiplier
/// let policy = BackoffPolicy::default();
///
/// // Custom policy
/// let policy = BackoffPolicy::new(Duration::from_millis(50), Duration::from_secs(5), 1.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Create a new backoff policy with jitter enabled
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate the delay for an attempt
    ///
    /// `delay = min(initial * multiplier^attempt, max)`, then jittered if
    /// enabled. Jitter never pushes the delay above `max_delay`.
    ///
    /// ```rust
    /// use queue_adapter::retry::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 2.0)
    ///     .without_jitter();
    ///
    /// assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
    /// assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
    /// assert_eq!(policy.calculate_delay(5), Duration::from_secs(4));
    /// ```
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let max_secs = self.max_delay.as_secs_f64();
        let capped_delay_secs = if base_delay_secs.is_finite() {
            base_delay_secs.min(max_secs)
        } else {
            max_secs
        };

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent).min(max_secs)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs.max(0.0))
    }

    /// Apply random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);

        (delay_secs + jitter).max(0.0)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
