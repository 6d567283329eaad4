//! Per-stage execution: the requires gate, deadline, retries, cancellation.
//!
//! One [`run_stage`] call resolves one descriptor to exactly one result,
//! however many attempts that takes. The phase barrier awaits these calls,
//! so every path out of here terminates.

use super::{should_retry, RetryConfig, RetryDecision, RetryState, StageDescriptor};
use crate::context::StageContext;
use crate::stages::{StageError, StageResult};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Resolved execution of one stage, attempts and timing included.
#[derive(Debug, Clone)]
pub struct StageExecution {
    /// The final result after all attempts.
    pub result: StageResult,
    /// Attempts made. Zero when the stage resolved before dispatch.
    pub attempts: u32,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When the final attempt resolved.
    pub finished_at: DateTime<Utc>,
}

/// Drives one stage to resolution against its phase snapshot.
pub(crate) async fn run_stage(
    descriptor: StageDescriptor,
    ctx: StageContext,
    deadline: Option<Duration>,
    retry: Option<RetryConfig>,
) -> StageExecution {
    let started_at = Utc::now();
    let clock = Instant::now();

    // Requires gate: a missing input resolves to Skipped, never Failed,
    // and the runner itself is not dispatched.
    if let Some(missing) = descriptor
        .requires
        .iter()
        .find(|key| !ctx.snapshot().contains(key))
    {
        let reason = format!("missing input: {missing}");
        ctx.try_emit_event("stage.skipped", Some(serde_json::json!({"reason": &reason})));
        return StageExecution {
            result: StageResult::skip(reason),
            attempts: 0,
            started_at,
            finished_at: Utc::now(),
        };
    }

    ctx.try_emit_event(
        "stage.started",
        Some(serde_json::json!({"phase_index": ctx.phase_index()})),
    );

    let mut state = RetryState::new();
    let mut attempts = 0u32;

    let result = loop {
        if ctx.is_cancelled() {
            break StageResult::fail(StageError::cancelled(cancel_message(&ctx)));
        }

        attempts += 1;
        let error = match execute_attempt(&descriptor, &ctx, deadline).await {
            StageResult::Failed { error } => error,
            resolved => break resolved,
        };

        let decision = match retry.as_ref() {
            Some(config) => should_retry(&mut state, config, &error),
            None => RetryDecision::GiveUp,
        };

        match decision {
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    stage = %descriptor.name,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying stage after error"
                );
                ctx.try_emit_event(
                    "stage.retrying",
                    Some(serde_json::json!({
                        "attempt": attempts,
                        "delay_ms": delay.as_millis() as u64,
                        "error": error.to_string(),
                    })),
                );
                // Wake early if the run is torn down mid-backoff.
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.cancel_token().cancelled() => {}
                }
            }
            RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                break StageResult::fail(error);
            }
        }
    };

    let duration_ms = clock.elapsed().as_secs_f64() * 1000.0;
    match &result {
        StageResult::Success { cost, .. } => {
            // Costs are charged as stages resolve, not at the barrier, so
            // concurrent siblings accumulate without coordination.
            let total = ctx.ledger().charge(*cost);
            ctx.try_emit_event(
                "stage.completed",
                Some(serde_json::json!({
                    "duration_ms": duration_ms,
                    "attempts": attempts,
                    "cost": cost.as_dollars(),
                    "ledger_total": total.as_dollars(),
                })),
            );
        }
        StageResult::Skipped { reason } => {
            ctx.try_emit_event(
                "stage.skipped",
                Some(serde_json::json!({"reason": reason, "duration_ms": duration_ms})),
            );
        }
        StageResult::Failed { error } => {
            ctx.try_emit_event(
                "stage.failed",
                Some(serde_json::json!({
                    "error": error.to_string(),
                    "kind": error.kind,
                    "attempts": attempts,
                    "duration_ms": duration_ms,
                })),
            );
        }
    }

    StageExecution {
        result,
        attempts,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Runs a single attempt, bounded by the deadline and the cancel token.
async fn execute_attempt(
    descriptor: &StageDescriptor,
    ctx: &StageContext,
    deadline: Option<Duration>,
) -> StageResult {
    let work = async {
        match deadline {
            Some(limit) => {
                match tokio::time::timeout(limit, descriptor.runner.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => StageResult::fail(StageError::timeout(limit)),
                }
            }
            None => descriptor.runner.execute(ctx).await,
        }
    };

    tokio::select! {
        result = work => result,
        () = ctx.cancel_token().cancelled() => {
            StageResult::fail(StageError::cancelled(cancel_message(ctx)))
        }
    }
}

fn cancel_message(ctx: &StageContext) -> String {
    ctx.cancel_token()
        .reason()
        .unwrap_or_else(|| "run cancelled".to_string())
}
