//! Mock stages for pipeline tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::context::StageContext;
use crate::stages::{Cost, Stage, StageError, StageResult};

/// A mock stage that records calls and returns a configurable result.
#[derive(Debug)]
pub struct MockStage {
    result: Mutex<StageResult>,
    call_count: Mutex<usize>,
    seen_stages: Mutex<Vec<String>>,
}

impl MockStage {
    /// Creates a mock resolving to an empty success.
    #[must_use]
    pub fn new() -> Self {
        Self::returning(StageResult::ok(serde_json::json!({})))
    }

    /// Creates a mock resolving to the given result.
    #[must_use]
    pub fn returning(result: StageResult) -> Self {
        Self {
            result: Mutex::new(result),
            call_count: Mutex::new(0),
            seen_stages: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the result returned by subsequent calls.
    pub fn set_result(&self, result: StageResult) {
        *self.result.lock() = result;
    }

    /// Number of times the stage executed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Stage names seen in each call's context.
    #[must_use]
    pub fn seen_stages(&self) -> Vec<String> {
        self.seen_stages.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.call_count.lock() = 0;
        self.seen_stages.lock().clear();
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn execute(&self, ctx: &StageContext) -> StageResult {
        *self.call_count.lock() += 1;
        self.seen_stages.lock().push(ctx.stage_name().to_string());
        self.result.lock().clone()
    }
}

/// A stage that always succeeds with a fixed payload and cost.
#[derive(Debug, Clone)]
pub struct StaticStage {
    payload: Value,
    cost: Cost,
}

impl StaticStage {
    /// Creates a stage succeeding with the given payload at zero cost.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            cost: Cost::zero(),
        }
    }

    /// Sets the cost reported alongside the payload.
    #[must_use]
    pub const fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }
}

#[async_trait]
impl Stage for StaticStage {
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        StageResult::ok_with_cost(self.payload.clone(), self.cost)
    }
}

/// A stage that always fails with a fixed error.
#[derive(Debug, Clone)]
pub struct FailingStage {
    error: StageError,
}

impl FailingStage {
    /// Fails with a permanent error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: StageError::permanent(message),
        }
    }

    /// Fails with a transient, retryable error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            error: StageError::transient(message),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        StageResult::fail(self.error.clone())
    }
}

/// A stage that fails transiently a set number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStage {
    failures: u32,
    payload: Value,
    calls: Mutex<u32>,
}

impl FlakyStage {
    /// Creates a stage that fails `failures` times before succeeding.
    #[must_use]
    pub fn new(failures: u32, payload: Value) -> Self {
        Self {
            failures,
            payload,
            calls: Mutex::new(0),
        }
    }

    /// Number of times the stage executed.
    #[must_use]
    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl Stage for FlakyStage {
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        let mut calls = self.calls.lock();
        *calls += 1;
        if *calls <= self.failures {
            StageResult::fail_transient(format!("flaky failure {} of {}", *calls, self.failures))
        } else {
            StageResult::ok(self.payload.clone())
        }
    }
}

/// A stage that sleeps before succeeding, for timeout and barrier tests.
#[derive(Debug, Clone)]
pub struct SleepStage {
    delay: Duration,
    payload: Value,
}

impl SleepStage {
    /// Creates a stage sleeping for the given duration.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            payload: serde_json::json!({}),
        }
    }

    /// Creates a stage sleeping for `ms` milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Sets the payload returned after the sleep.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[async_trait]
impl Stage for SleepStage {
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        tokio::time::sleep(self.delay).await;
        StageResult::ok(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_stage_records_calls() {
        let stage = MockStage::new();
        let ctx = TestContext::new().build_stage_context("mock");

        let result = stage.execute(&ctx).await;
        assert!(result.is_success());
        assert_eq!(stage.call_count(), 1);

        stage.set_result(StageResult::skip("nothing to do"));
        let result = stage.execute(&ctx).await;
        assert!(result.is_skipped());
        assert_eq!(stage.call_count(), 2);
        assert_eq!(stage.seen_stages(), vec!["mock", "mock"]);

        stage.reset();
        assert_eq!(stage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_static_stage_reports_cost() {
        let stage = StaticStage::new(json!({"hook": "sale"})).with_cost(Cost::from_dollars(1.5));
        let ctx = TestContext::new().build_stage_context("static");

        let result = stage.execute(&ctx).await;
        assert_eq!(result.cost(), Cost::from_dollars(1.5));
        assert_eq!(result.payload(), Some(&json!({"hook": "sale"})));
    }

    #[tokio::test]
    async fn test_failing_stage_kinds() {
        let ctx = TestContext::new().build_stage_context("fail");

        let permanent = FailingStage::new("bad input").execute(&ctx).await;
        assert!(!permanent.is_retryable());

        let transient = FailingStage::transient("rate limited").execute(&ctx).await;
        assert!(transient.is_retryable());
    }

    #[tokio::test]
    async fn test_flaky_stage_recovers() {
        let stage = FlakyStage::new(2, json!({"ok": true}));
        let ctx = TestContext::new().build_stage_context("flaky");

        assert!(stage.execute(&ctx).await.is_failed());
        assert!(stage.execute(&ctx).await.is_failed());
        assert!(stage.execute(&ctx).await.is_success());
        assert_eq!(stage.calls(), 3);
    }

    #[tokio::test]
    async fn test_sleep_stage_delays() {
        let stage = SleepStage::with_delay_ms(10).with_payload(json!({"done": true}));
        let ctx = TestContext::new().build_stage_context("slow");

        let start = std::time::Instant::now();
        let result = stage.execute(&ctx).await;

        assert!(result.is_success());
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
