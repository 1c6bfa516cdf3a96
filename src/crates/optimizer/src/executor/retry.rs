//! Retry Logic for LLM Calls
//!
//! Bounded retries with exponential backoff, error classification
//! (transient vs permanent), and structured logging of every failed attempt.

use crate::{OptimizerError, Result};
use llm::LlmError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Classification of errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry (rate limits, timeouts, 5xx)
    Transient,

    /// Permanent errors that won't succeed on retry (bad credentials, malformed request)
    Permanent,

    /// Unknown errors - treated as transient
    Unknown,
}

/// Retry strategy configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_retries: u32,

    /// Delay before the second attempt, in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay, in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set initial backoff delay
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set maximum backoff delay
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before `attempt` (1-based).
    ///
    /// Attempt 1 runs immediately; attempt `n >= 2` waits
    /// `initial * multiplier^(n-2)` plus optional jitter, capped at
    /// `max_backoff_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay.min(self.max_backoff_ms as f64) as u64;

        let delay_ms = if self.jitter {
            let jitter_amount = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms.saturating_add(jitter_amount)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(OptimizerError::Config(
                "retry.max_retries must be at least 1".to_string(),
            ));
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(OptimizerError::Config(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(OptimizerError::Config(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }

        Ok(())
    }
}

/// Classify an error to determine if it should be retried
pub fn classify_error(error: &LlmError) -> ErrorClass {
    if !error.is_retryable() {
        return ErrorClass::Permanent;
    }

    match error {
        LlmError::HttpError(_)
        | LlmError::ServiceUnavailable(_)
        | LlmError::RateLimitExceeded(_)
        | LlmError::Timeout(_) => ErrorClass::Transient,
        _ => ErrorClass::Unknown,
    }
}

/// Successful outcome of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Value returned by the successful attempt
    pub value: T,

    /// Attempt number that succeeded (1-based)
    pub attempts: u32,

    /// Total time spent sleeping between attempts
    pub total_delay: Duration,
}

#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    accumulated_delay: Duration,
    last_error: Option<LlmError>,
}

/// Runs a unit of work with bounded retries
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `work` until it succeeds, hits a permanent error, or runs out
    /// of attempts.
    ///
    /// # Arguments
    /// * `operation_name` - Name of the operation for logging and errors
    /// * `work` - Zero-argument closure producing one attempt
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut work: F) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, LlmError>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut state = RetryState::default();

        while state.attempt < max_attempts {
            state.attempt += 1;

            let delay = self.config.backoff_delay(state.attempt);
            if !delay.is_zero() {
                info!(
                    operation = operation_name,
                    attempt = state.attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying operation after backoff"
                );
                tokio::time::sleep(delay).await;
                state.accumulated_delay += delay;
            }

            match work().await {
                Ok(value) => {
                    if state.attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt = state.attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(RetryOutcome {
                        value,
                        attempts: state.attempt,
                        total_delay: state.accumulated_delay,
                    });
                }
                Err(e) => {
                    let error_class = classify_error(&e);

                    debug!(
                        operation = operation_name,
                        attempt = state.attempt,
                        classification = ?error_class,
                        "Operation failed"
                    );

                    if error_class == ErrorClass::Permanent {
                        error!(
                            operation = operation_name,
                            attempt = state.attempt,
                            error = %e,
                            "Permanent error detected, aborting retries"
                        );
                        return Err(OptimizerError::CallRejected {
                            operation: operation_name.to_string(),
                            source: e,
                        });
                    }

                    warn!(
                        operation = operation_name,
                        attempt = state.attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    state.last_error = Some(e);
                }
            }
        }

        let source = state.last_error.unwrap_or_else(|| {
            LlmError::Other(format!("{} produced no attempts", operation_name))
        });

        error!(
            operation = operation_name,
            attempts = state.attempt,
            error = %source,
            "All retry attempts exhausted"
        );

        Err(OptimizerError::ExhaustedRetries {
            operation: operation_name.to_string(),
            attempts: state.attempt,
            source,
        })
    }
}

/// Execute a function with retry logic and return only its value
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `work` - Async closure to execute
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    work: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, LlmError>>,
{
    RetryExecutor::new(config.clone())
        .execute(operation_name, work)
        .await
        .map(|outcome| outcome.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 1000);
        assert_eq!(config.max_backoff_ms, 60_000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(!config.jitter);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new(5)
            .with_initial_backoff(500)
            .with_max_backoff(30_000)
            .with_multiplier(1.5)
            .with_jitter(true);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_backoff_ms, 500);
        assert_eq!(config.max_backoff_ms, 30_000);
        assert_eq!(config.backoff_multiplier, 1.5);
        assert!(config.jitter);
    }

    #[test]
    fn test_backoff_delay_exponential() {
        let config = RetryConfig::new(4).with_initial_backoff(1000);

        assert_eq!(config.backoff_delay(1), Duration::ZERO);
        assert_eq!(config.backoff_delay(2).as_millis(), 1000);
        assert_eq!(config.backoff_delay(3).as_millis(), 2000);
        assert_eq!(config.backoff_delay(4).as_millis(), 4000);
    }

    #[test]
    fn test_backoff_delay_max_cap() {
        let config = RetryConfig::new(10)
            .with_initial_backoff(1000)
            .with_max_backoff(5000);

        // 1000 * 2^5 uncapped
        assert_eq!(config.backoff_delay(7).as_millis(), 5000);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let config = RetryConfig::new(3).with_initial_backoff(1000).with_jitter(true);
        for _ in 0..50 {
            let delay = config.backoff_delay(2).as_millis();
            assert!((1000..=1250).contains(&delay));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let config = RetryConfig::new(10)
            .with_initial_backoff(1000)
            .with_max_backoff(3000)
            .with_jitter(true);
        for attempt in 2..10 {
            assert!(config.backoff_delay(attempt) <= Duration::from_millis(3000));
        }

        let huge = RetryConfig::new(10)
            .with_initial_backoff(u64::MAX / 2)
            .with_max_backoff(u64::MAX)
            .with_jitter(true);
        assert!(huge.backoff_delay(5) <= Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::new(0).validate().is_err());
        assert!(RetryConfig::default().with_multiplier(0.5).validate().is_err());
        assert!(RetryConfig::default()
            .with_initial_backoff(10_000)
            .with_max_backoff(1000)
            .validate()
            .is_err());
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&LlmError::RateLimitExceeded("429".into())),
            ErrorClass::Transient
        );
        assert_eq!(classify_error(&LlmError::Timeout("t".into())), ErrorClass::Transient);
        assert_eq!(
            classify_error(&LlmError::ServiceUnavailable("503".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&LlmError::AuthenticationError("401".into())),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_error(&LlmError::InvalidRequest("400".into())),
            ErrorClass::Permanent
        );
        assert_eq!(classify_error(&LlmError::Other("??".into())), ErrorClass::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_first_attempt() {
        let config = RetryConfig::new(3);
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let outcome = RetryExecutor::new(config)
            .execute("test_operation", move || {
                let count = Arc::clone(&attempt_count_clone);
                async move {
                    *count.lock().unwrap() += 1;
                    Ok::<i32, LlmError>(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_transient_errors() {
        let config = RetryConfig::new(3).with_initial_backoff(10);
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let outcome = RetryExecutor::new(config)
            .execute("test_operation", move || {
                let count = Arc::clone(&attempt_count_clone);
                async move {
                    let current = {
                        let mut c = count.lock().unwrap();
                        *c += 1;
                        *c
                    };

                    if current < 3 {
                        Err(LlmError::ServiceUnavailable("503".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.total_delay, Duration::from_millis(30));
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_abort_on_permanent_error() {
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result: Result<()> = retry_with_backoff(&RetryConfig::new(3), "test_operation", move || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                *count.lock().unwrap() += 1;
                Err(LlmError::AuthenticationError("401 Unauthorized".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(OptimizerError::CallRejected { .. })));
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaust_all_attempts() {
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result: Result<()> = retry_with_backoff(&RetryConfig::new(3), "test_operation", move || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                let n = {
                    let mut c = count.lock().unwrap();
                    *c += 1;
                    *c
                };
                Err(LlmError::Timeout(format!("attempt {}", n)))
            }
        })
        .await;

        match result {
            Err(OptimizerError::ExhaustedRetries { operation, attempts, source }) => {
                assert_eq!(operation, "test_operation");
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "Request timeout: attempt 3");
            }
            other => panic!("expected ExhaustedRetries, got {:?}", other),
        }
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_errors_are_retried() {
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result: Result<()> = retry_with_backoff(&RetryConfig::new(2), "test_operation", move || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                *count.lock().unwrap() += 1;
                Err(LlmError::InvalidResponse("no choices".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(OptimizerError::ExhaustedRetries { attempts: 2, .. })));
        assert_eq!(*attempt_count.lock().unwrap(), 2);
    }
}
