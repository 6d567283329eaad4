//! The execution context handed to a stage.

use crate::cancellation::CancelToken;
use crate::config::RunConfig;
use crate::context::{ContextSnapshot, RunIdentity};
use crate::events::{get_event_sink, EventSink};
use crate::ledger::CostLedger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage may read while executing.
///
/// The snapshot is immutable and shared by all stages of the phase; the
/// ledger and cancel token are the run-wide shared handles. Stages never
/// write to the run context directly — their returned result is merged by
/// the orchestrator after the phase barrier.
#[derive(Clone)]
pub struct StageContext {
    stage_name: String,
    snapshot: ContextSnapshot,
    config: Arc<RunConfig>,
    params: serde_json::Value,
    identity: RunIdentity,
    ledger: Arc<CostLedger>,
    cancel_token: Arc<CancelToken>,
    event_sink: Arc<dyn EventSink>,
    output_dir: Option<PathBuf>,
}

impl StageContext {
    /// Creates a context with default run-wide handles: an unbounded
    /// ledger, a fresh cancel token, the global event sink.
    ///
    /// The orchestrator overrides all of them; the defaults make stage unit
    /// tests short.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        snapshot: ContextSnapshot,
        config: Arc<RunConfig>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            snapshot,
            config,
            params: serde_json::Value::Null,
            identity: RunIdentity::new(),
            ledger: Arc::new(CostLedger::unbounded()),
            cancel_token: CancelToken::new(),
            event_sink: get_event_sink(),
            output_dir: None,
        }
    }

    /// Sets the stage-specific params value.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Sets the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the shared cost ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<CostLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Sets the run-level cancel token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancelToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the run's shared output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Returns the executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the context snapshot taken at phase start.
    #[must_use]
    pub const fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    /// Returns an upstream payload by its produces key.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&serde_json::Value> {
        self.snapshot.get(key)
    }

    /// Returns the phase index the stage is running in.
    #[must_use]
    pub const fn phase_index(&self) -> usize {
        self.snapshot.phase_index()
    }

    /// Returns the uniform run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the stage-specific params value (Null when unset).
    #[must_use]
    pub const fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// Returns the run identity.
    #[must_use]
    pub const fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the shared cost ledger.
    #[must_use]
    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Returns the run-level cancel token.
    #[must_use]
    pub const fn cancel_token(&self) -> &Arc<CancelToken> {
        &self.cancel_token
    }

    /// Returns true once run-level cancellation has been requested. Stages
    /// doing long work should poll this at their own suspension points.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Returns the run's shared output directory, when configured.
    #[must_use]
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Emits a stage-scoped event, enriched with run and stage identity.
    /// Never blocks, never panics.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = match data {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        enriched.insert(
            "run_id".to_string(),
            serde_json::json!(self.identity.run_id.to_string()),
        );
        enriched.insert("stage".to_string(), serde_json::json!(self.stage_name));
        self.event_sink
            .try_emit(event_type, Some(serde_json::Value::Object(enriched)));
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage_name", &self.stage_name)
            .field("phase_index", &self.phase_index())
            .field("run_id", &self.identity.run_id)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::events::CollectingEventSink;
    use serde_json::json;

    fn snapshot_with(key: &str, value: serde_json::Value) -> ContextSnapshot {
        let mut ctx = RunContext::new();
        ctx.merge(key, value).unwrap();
        ctx.snapshot()
    }

    #[test]
    fn test_context_reads_snapshot() {
        let snapshot = snapshot_with("ReviewsResearch", json!({"themes": ["grip"]}));
        let ctx = StageContext::new(
            "ScriptWriter",
            snapshot,
            Arc::new(RunConfig::new("trail shoes")),
        );

        assert_eq!(ctx.stage_name(), "ScriptWriter");
        assert_eq!(ctx.input("ReviewsResearch"), Some(&json!({"themes": ["grip"]})));
        assert!(ctx.input("TrendsResearch").is_none());
        assert_eq!(ctx.config().product, "trail shoes");
    }

    #[test]
    fn test_context_defaults() {
        let ctx = StageContext::new(
            "VideoGen",
            ContextSnapshot::empty(),
            Arc::new(RunConfig::new("candles")),
        );

        assert!(ctx.params().is_null());
        assert!(!ctx.is_cancelled());
        assert!(ctx.output_dir().is_none());
        assert!(ctx.ledger().total().is_zero());
    }

    #[test]
    fn test_context_cancellation_visible() {
        let token = CancelToken::new();
        let ctx = StageContext::new(
            "VideoGen",
            ContextSnapshot::empty(),
            Arc::new(RunConfig::new("candles")),
        )
        .with_cancel_token(token.clone());

        assert!(!ctx.is_cancelled());
        token.cancel("user abort");
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_try_emit_event_enriches_payload() {
        let sink = Arc::new(CollectingEventSink::new());
        let identity = RunIdentity::new();
        let ctx = StageContext::new(
            "TrendsResearch",
            ContextSnapshot::empty(),
            Arc::new(RunConfig::new("candles")),
        )
        .with_identity(identity.clone())
        .with_event_sink(sink.clone());

        ctx.try_emit_event("stage.progress", Some(json!({"pct": 50})));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let data = events[0].1.as_ref().unwrap();
        assert_eq!(data["pct"], 50);
        assert_eq!(data["stage"], "TrendsResearch");
        assert_eq!(data["run_id"], identity.run_id.to_string());
    }

    #[test]
    fn test_non_object_event_data_is_wrapped() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StageContext::new(
            "TrendsResearch",
            ContextSnapshot::empty(),
            Arc::new(RunConfig::new("candles")),
        )
        .with_event_sink(sink.clone());

        ctx.try_emit_event("stage.progress", Some(json!("halfway")));

        let events = sink.events();
        assert_eq!(events[0].1.as_ref().unwrap()["data"], "halfway");
    }
}
