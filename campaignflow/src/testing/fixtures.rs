//! Test fixtures for building stage contexts.

use crate::config::RunConfig;
use crate::context::{RunContext, StageContext};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for stage contexts seeded with upstream outputs.
#[derive(Debug, Default)]
pub struct TestContext {
    /// Upstream outputs to place in the snapshot.
    values: HashMap<String, Value>,
    /// Phase index the snapshot reports.
    phase_index: usize,
    /// Run config override.
    config: Option<RunConfig>,
}

impl TestContext {
    /// Creates a new test context builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an upstream output under the given key.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Sets the phase index the snapshot reports.
    #[must_use]
    pub const fn at_phase(mut self, index: usize) -> Self {
        self.phase_index = index;
        self
    }

    /// Overrides the run config. Defaults to a minimal test config.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds a stage context over a snapshot of the seeded values.
    ///
    /// The context carries default collaborators; chain the stage context's
    /// own `with_*` builders to swap in a shared ledger, token, or sink.
    #[must_use]
    pub fn build_stage_context(&self, stage_name: &str) -> StageContext {
        let mut context = RunContext::new();
        for (key, value) in &self.values {
            // Keys are unique per map, so a conflict cannot occur.
            let _ = context.merge(key, value.clone());
        }
        context.advance_to_phase(self.phase_index);

        let config = self
            .config
            .clone()
            .unwrap_or_else(|| RunConfig::new("test-product"));

        StageContext::new(stage_name, context.snapshot(), Arc::new(config))
    }
}
