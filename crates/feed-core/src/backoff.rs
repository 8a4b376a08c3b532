//! Reconnect backoff policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for automatic reconnection
///
/// The delay before the k-th automatic attempt (1-based) is
/// `min(max_interval, initial_interval * backoff_coefficient^(k-1))`.
/// No jitter is applied, so the schedule is exact.
///
/// # Example
///
/// ```
/// use docflow_feed_core::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::default();
///
/// // 0.5s, 1s, 2s, 4s, 8s, then capped at 10s
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
/// assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of automatic attempts before giving up
    pub max_attempts: u32,

    /// Delay before the first automatic attempt
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (2.0 doubles the delay per attempt)
    pub backoff_coefficient: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl ReconnectPolicy {
    /// 5 attempts, 500ms initial delay, doubling, capped at 10s
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2.0,
        }
    }

    /// Never reconnect automatically
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Delay before automatic attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms =
            self.initial_interval.as_millis() as f64 * self.backoff_coefficient.powi(exponent);
        let capped_ms = base_ms.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms.round() as u64)
    }

    /// Whether another automatic attempt is allowed after `attempts_made`
    pub fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
