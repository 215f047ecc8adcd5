//! Configuration for the sync engine.

use ledgersync_protocol::{MergeOptions, DEFAULT_CONFLICT_THRESHOLD_MS};
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum `updated_at` distance, in milliseconds, that still makes two
    /// differing versions a true conflict.
    pub conflict_threshold_ms: i64,
    /// How long `Success`/`InSync` stay visible before returning to `Idle`.
    pub display_delay: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            conflict_threshold_ms: DEFAULT_CONFLICT_THRESHOLD_MS,
            display_delay: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the conflict threshold.
    pub fn with_conflict_threshold_ms(mut self, ms: i64) -> Self {
        self.conflict_threshold_ms = ms.max(0);
        self
    }

    /// Sets the display delay.
    pub fn with_display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = delay;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the merge options derived from this configuration.
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::with_threshold_ms(self.conflict_threshold_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = delay_secs.min(self.max_delay.as_secs_f64());
        if delay_secs.is_nan() || delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_conflict_threshold_ms(5000)
            .with_display_delay(Duration::from_millis(10))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.conflict_threshold_ms, 5000);
        assert_eq!(config.display_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(
            config.merge_options().conflict_threshold,
            chrono::Duration::milliseconds(5000)
        );
    }

    #[test]
    fn negative_threshold_clamps_to_zero() {
        let config = SyncConfig::new().with_conflict_threshold_ms(-5);
        assert_eq!(config.conflict_threshold_ms, 0);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn negative_backoff_never_goes_below_zero() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(-2.0);

        assert_eq!(config.delay_for_attempt(2), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }
}
