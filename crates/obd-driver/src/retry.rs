//! Retry policy with exponential backoff and jitter

use std::future::Future;
use std::time::Duration;

use obd_core::{ObdError, ObdResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Relative jitter applied after capping, in [0, 1]
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    1.5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::operation()
    }
}

impl RetryPolicy {
    /// Policy for establishing the adapter link
    pub fn connect() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.3,
        }
    }

    /// Policy for the AT init sequence
    pub fn init() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }

    /// Policy for ordinary diagnostic operations
    pub fn operation() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 1.5,
            jitter_factor: 0.1,
        }
    }

    /// A single-attempt policy (no retries)
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Delay before retry number `attempt` (1-based: attempt 1 is the first
/// retry). Exponential in the attempt number, capped at `max_delay_ms`,
/// then jittered by up to `±jitter_factor` of the capped value.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let raw = policy.base_delay_ms as f64 * policy.backoff_multiplier.powi(exponent as i32);
    let capped = raw.min(policy.max_delay_ms as f64);
    let jittered = if policy.jitter_factor > 0.0 {
        let spread = capped * policy.jitter_factor;
        capped + rand::thread_rng().gen_range(-spread..=spread)
    } else {
        capped
    };
    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Run `operation` under `policy`.
///
/// Retries only errors whose `is_retryable()` is true; anything else
/// propagates immediately. The attempt number passed to the operation is
/// 1-based. When the budget is exhausted the last error is returned.
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, operation: F) -> ObdResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ObdResult<T>>,
{
    retry_with_policy_hooked(policy, operation, |_| {}, |_, _| {}).await
}

/// [`retry_with_policy`] with observation hooks: `on_attempt` fires before
/// each attempt, `on_failure` after each retryable failure.
pub async fn retry_with_policy_hooked<T, F, Fut, A, E>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_attempt: A,
    mut on_failure: E,
) -> ObdResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ObdResult<T>>,
    A: FnMut(u32),
    E: FnMut(u32, &ObdError),
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<ObdError> = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(backoff_delay(attempt - 1, policy)).await;
        }
        on_attempt(attempt);
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::debug!(
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "retryable failure, backing off"
                );
                on_failure(attempt, &err);
                last_error = Some(err);
            }
            Err(err) => {
                on_failure(attempt, &err);
                return Err(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ObdError::Internal("retry budget was zero".to_string())))
}
