//! Retry policy for failed stage attempts, with configurable backoff and jitter.
//!
//! Retries apply only to failures whose [`StageErrorKind`](crate::stages::StageErrorKind)
//! is retryable. Permanent failures and cancellations are surfaced immediately.

use crate::stages::StageError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for delays between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent synchronized retries across concurrent stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for retrying a stage after a retryable failure.
///
/// Absent from a stage descriptor, the stage gets exactly one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// Attempt tracking for a single stage's retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Completed attempts so far (0 before the first attempt fails).
    pub attempt: u32,
    /// Previous delay, used by decorrelated jitter.
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a fresh retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the attempt budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = self.attempt;

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exp = base.saturating_mul(2u64.saturating_pow(attempt));
                exp.min(max)
            }
            BackoffStrategy::Linear => {
                let linear = base.saturating_mul(u64::from(attempt) + 1);
                linear.min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delay_ms = Some(next);
                next
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Attempt budget spent, surface the failure.
    GiveUp,
    /// The error kind is not retryable, surface the failure.
    NotRetryable,
}

/// Decides whether a failed attempt should be retried.
///
/// Counts the failed attempt against the budget, then checks the error
/// kind and remaining budget before computing a backoff delay.
#[must_use]
pub fn should_retry(
    state: &mut RetryState,
    config: &RetryConfig,
    error: &StageError,
) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }

    state.attempt += 1;
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }

    RetryDecision::Retry(state.calculate_delay(config))
}
