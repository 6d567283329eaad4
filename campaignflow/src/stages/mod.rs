//! Stage trait and function adapters.
//!
//! Stages are the units of work a plan schedules. Identity, dependencies and
//! scheduling knobs live on the [`StageDescriptor`](crate::pipeline::StageDescriptor);
//! the trait is only the work function.

mod result;

pub use result::{Cost, StageError, StageErrorKind, StageResult};

use crate::context::StageContext;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// A stage reads its context snapshot and resolves to exactly one
/// [`StageResult`] tag. It must not mutate shared state; the ledger handle
/// on the context is the one sanctioned exception.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Executes the stage against a phase snapshot.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage execution context
    ///
    /// # Returns
    ///
    /// The stage's resolution: Success, Skipped or Failed.
    async fn execute(&self, ctx: &StageContext) -> StageResult;
}

/// A synchronous function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    /// Creates a stage from a closure.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    async fn execute(&self, ctx: &StageContext) -> StageResult {
        (self.func)(ctx)
    }
}

/// An async function-based stage.
///
/// The closure receives an owned clone of the context, so the returned
/// future borrows nothing.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageResult> + Send,
{
    func: F,
    _phantom: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageResult> + Send,
{
    /// Creates a stage from an async closure.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageResult> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageResult> + Send,
{
    async fn execute(&self, ctx: &StageContext) -> StageResult {
        (self.func)(ctx.clone()).await
    }
}

/// A stage that succeeds with an empty payload at zero cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStage;

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for NoOpStage {
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        StageResult::ok(serde_json::json!({}))
    }
}
