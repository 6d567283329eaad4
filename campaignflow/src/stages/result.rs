//! Tagged stage results, cost accounting and boundary error classification.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Micros of one currency unit per dollar.
const MICROS_PER_DOLLAR: u64 = 1_000_000;

/// A fixed-point amount of money, in micros of the run's currency unit.
///
/// Costs accumulate in the [`CostLedger`](crate::ledger::CostLedger) and are
/// reported by successful stages. Arithmetic saturates rather than wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cost {
    micros: u64,
}

impl Cost {
    /// A zero cost.
    #[must_use]
    pub const fn zero() -> Self {
        Self { micros: 0 }
    }

    /// Creates a cost from raw micros.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Creates a cost from a dollar amount. Negative or NaN amounts clamp to zero.
    #[must_use]
    pub fn from_dollars(dollars: f64) -> Self {
        let micros = (dollars * MICROS_PER_DOLLAR as f64).round().max(0.0) as u64;
        Self { micros }
    }

    /// Returns the raw micros.
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.micros
    }

    /// Returns the amount in dollars.
    #[must_use]
    pub fn as_dollars(self) -> f64 {
        self.micros as f64 / MICROS_PER_DOLLAR as f64
    }

    /// Returns true if the cost is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.micros == 0
    }

    /// Adds two costs, saturating at the numeric bound.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self {
            micros: self.micros.saturating_add(rhs.micros),
        }
    }
}

impl std::fmt::Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.2}", self.as_dollars())
    }
}

/// Classification of a stage failure, assigned at the stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Transient fault (network, rate limit). Eligible for bounded retry.
    Transient,
    /// The attempt overran its deadline. Retried like a transient fault.
    Timeout,
    /// Permanent fault (bad input, validation). Never retried.
    Permanent,
    /// The run-level cancel signal interrupted the attempt. Never retried.
    Cancelled,
}

impl StageErrorKind {
    /// Returns true if failures of this kind may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Timeout => write!(f, "timeout"),
            Self::Permanent => write!(f, "permanent"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A classified stage failure.
///
/// Every failure that reaches the orchestrator carries a kind; the runner
/// classifies timeouts and cancellations itself, so an unclassified failure
/// cannot cross the stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StageError {
    /// Failure classification.
    pub kind: StageErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl StageError {
    /// Creates a classified error.
    #[must_use]
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Transient, message)
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Permanent, message)
    }

    /// Creates a timeout error for an attempt that overran `deadline`.
    #[must_use]
    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            StageErrorKind::Timeout,
            format!("attempt exceeded the {}ms deadline", deadline.as_millis()),
        )
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(StageErrorKind::Cancelled, reason)
    }

    /// Returns true if this error may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// The resolution of a stage: exactly one tag is active.
///
/// Skipped and Failed results never populate the run context; only Success
/// payloads are merged. The tag survives serialization, so records
/// round-trip losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageResult {
    /// The stage produced a payload, at the given cost.
    Success {
        /// Opaque output payload, merged into the run context.
        payload: serde_json::Value,
        /// Cost incurred by the attempt that produced the payload.
        cost: Cost,
    },
    /// The stage declined to run. Not an error.
    Skipped {
        /// Why the stage declined.
        reason: String,
    },
    /// The stage failed with a classified error.
    Failed {
        /// The classified failure.
        error: StageError,
    },
}

impl StageResult {
    /// Creates a zero-cost success.
    #[must_use]
    pub const fn ok(payload: serde_json::Value) -> Self {
        Self::Success {
            payload,
            cost: Cost::zero(),
        }
    }

    /// Creates a success with an incurred cost.
    #[must_use]
    pub const fn ok_with_cost(payload: serde_json::Value, cost: Cost) -> Self {
        Self::Success { payload, cost }
    }

    /// Creates a skip with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Creates a failure from a classified error.
    #[must_use]
    pub const fn fail(error: StageError) -> Self {
        Self::Failed { error }
    }

    /// Creates a transient failure.
    #[must_use]
    pub fn fail_transient(message: impl Into<String>) -> Self {
        Self::fail(StageError::transient(message))
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn fail_permanent(message: impl Into<String>) -> Self {
        Self::fail(StageError::permanent(message))
    }

    /// Returns true for Success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true for Skipped.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns true for Failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the payload for Success results.
    #[must_use]
    pub const fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Returns the incurred cost. Zero for Skipped and Failed.
    #[must_use]
    pub const fn cost(&self) -> Cost {
        match self {
            Self::Success { cost, .. } => *cost,
            _ => Cost::zero(),
        }
    }

    /// Returns the skip reason for Skipped results.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skipped { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns the classified error for Failed results.
    #[must_use]
    pub const fn error(&self) -> Option<&StageError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Returns true if this is a Failed result eligible for retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { error } => error.is_retryable(),
            _ => false,
        }
    }

    /// Returns the status tag as a string, for events and log fields.
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}
