//! Retry logic for thermostat operations.
//!
//! Commands are retried on a missing response, connections on transient
//! link failures. Policy refusals and malformed input never are.
//!
//! # Example
//!
//! ```
//! use eqiva_core::{RetryConfig, with_retry, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::new(2);
//!
//! let result = with_retry(&config, "connect", || async {
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ConnectionFailureReason, Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries (for exponential backoff).
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A command is resent exactly once when its response does not arrive.
    pub fn for_command() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(250),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Set maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Total attempts including the first.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% extra
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute an async operation, retrying transient failures.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_if(config, operation_name, is_retryable, operation).await
}

/// Execute an async operation, retrying errors accepted by `should_retry`.
///
/// Returns the last error once the retries are exhausted.
pub async fn with_retry_if<F, Fut, T, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt < config.max_retries && should_retry(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.attempts(),
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if an error is worth another attempt.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout { .. } | Error::Bluetooth(_) | Error::NotConnected => true,
        Error::ConnectionFailed { reason, .. } => matches!(
            reason,
            ConnectionFailureReason::Timeout
                | ConnectionFailureReason::LinkLost
                | ConnectionFailureReason::BleError(_)
                | ConnectionFailureReason::Other(_)
        ),
        Error::CommandTimeout { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceNotFoundReason;
    use eqiva_types::{EffectiveMode, EncodeError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_none_makes_a_single_attempt() {
        let config = RetryConfig::none();
        assert_eq!(config.attempts(), 1);
        assert_eq!(RetryConfig::none().max_retries(2).attempts(), 3);
    }

    #[test]
    fn test_command_preset_retries_once() {
        let config = RetryConfig::for_command();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.attempts(), 2);
        assert!(!config.jitter);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(300),
            jitter: false,
            max_retries: 5,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&Error::timeout("write", Duration::from_secs(1))));
        assert!(is_retryable(&Error::NotConnected));
        assert!(!is_retryable(&Error::Encoding(
            EncodeError::TemperatureOutOfRange(31.0)
        )));
        assert!(!is_retryable(&Error::unsupported(
            "set_temperature",
            EffectiveMode::BoostActive
        )));
        assert!(!is_retryable(&Error::DeviceNotFound(
            DeviceNotFoundReason::NotFound {
                identifier: "test".to_string()
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_eventual_success() {
        let config = RetryConfig::new(3).jitter(false);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<i32> = with_retry(&config, "test", || {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::NotConnected)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_if_stops_on_rejected_error() {
        let config = RetryConfig::new(3).jitter(false);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<i32> = with_retry_if(
            &config,
            "test",
            |e| matches!(e, Error::CommandTimeout { .. }),
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::NotConnected)
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_all_fail() {
        let config = RetryConfig::for_command();
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<i32> = with_retry(&config, "test", || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::CommandTimeout {
                    command: "pair",
                    timeout: Duration::from_secs(3),
                    attempts: 1,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
