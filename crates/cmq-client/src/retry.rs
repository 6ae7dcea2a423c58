//! # Retry and Deadline Control
//!
//! Every service exchange runs under the client deadline and transient
//! failures are retried with exponential backoff and jitter.
//!
//! Long-poll receives need no special handling here: the polling window is
//! validated to be shorter than the deadline before a request is built.

use crate::config::RetryConfig;
use crate::error::CmqError;
use crate::request::Action;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use cmq_client::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 retries, 200ms initial, 5s max, 2.0x multiplier
/// let policy = RetryPolicy::default();
///
/// // Custom policy
/// let policy = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(10), 1.5);
/// assert_eq!(policy.total_attempts(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            use_jitter: config.use_jitter,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with ±25% jitter
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum retry attempts after the initial request
    /// * `initial_delay` - Initial delay before first retry
    /// * `max_delay` - Maximum delay cap
    /// * `backoff_multiplier` - Exponential growth factor
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Policy that surfaces the first failure
    pub fn no_retry() -> Self {
        Self::from(&RetryConfig::disabled())
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay for a specific retry attempt
    ///
    /// `delay = initial * multiplier^attempt`, capped at `max_delay`, with
    /// jitter applied when enabled.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Retry attempt number (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs)
    }

    /// Check if we should retry for this attempt number (0-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Applies random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }

    /// Total number of requests (initial + retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts + 1
    }
}

/// State tracker for retry operations
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based)
    pub attempt: u32,

    /// Total attempts made so far (including initial)
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Next delay, stretched to the error's retry hint when that is longer
    pub fn get_delay(&self, policy: &RetryPolicy, error: &CmqError) -> Duration {
        let delay = policy.calculate_delay(self.attempt);
        match error.retry_after() {
            Some(hint) => delay.max(hint.min(policy.max_delay)),
            None => delay,
        }
    }

    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// Each attempt is bounded by `deadline`; expiry yields [`CmqError::Timeout`],
/// which is never retried.
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Duration,
    action: Action,
    mut operation: F,
) -> Result<T, CmqError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CmqError>>,
{
    let mut retry_state = RetryState::new();

    loop {
        let outcome = match tokio::time::timeout(deadline, operation()).await {
            Ok(result) => result,
            Err(_) => Err(CmqError::Timeout { duration: deadline }),
        };

        match outcome {
            Ok(value) => {
                if retry_state.total_attempts > 1 {
                    debug!(
                        action = %action,
                        total_attempts = retry_state.total_attempts,
                        "Request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && retry_state.can_retry(policy) => {
                let delay = retry_state.get_delay(policy, &error);
                warn!(
                    action = %action,
                    attempt = retry_state.total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    code = ?error.code(),
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                retry_state.next_attempt();
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
