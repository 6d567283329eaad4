//! Plan types: stage descriptors grouped into ordered phases.
//!
//! A [`Plan`] is immutable once built. Construction goes through
//! [`PlanBuilder`](crate::pipeline::PlanBuilder), which validates the
//! requires/produces graph before any stage can be dispatched.

use super::{PhasePolicy, PlanBuilder, RetryConfig};
use crate::errors::PlanError;
use crate::stages::Stage;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Immutable description of one schedulable unit within a plan.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Unique stage name across the whole plan.
    pub name: String,
    /// The unit of work dispatched when the stage runs.
    pub runner: Arc<dyn Stage>,
    /// Context keys that must be present before this stage may execute.
    /// Each must be produced by a stage in a strictly earlier phase.
    pub requires: BTreeSet<String>,
    /// Context key the stage's `Success` payload is stored under.
    /// Defaults to the stage name.
    pub produces: String,
    /// Stage-specific parameters, handed through untouched.
    pub params: Value,
    /// Per-attempt deadline. Falls back to the plan default when unset.
    pub timeout: Option<Duration>,
    /// Retry policy for retryable failures. Falls back to the plan default;
    /// no policy anywhere means a single attempt.
    pub retry: Option<RetryConfig>,
}

impl StageDescriptor {
    /// Creates a descriptor producing under its own name.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        let name = name.into();
        Self {
            produces: name.clone(),
            name,
            runner,
            requires: BTreeSet::new(),
            params: Value::Null,
            timeout: None,
            retry: None,
        }
    }

    /// Replaces the required input keys.
    #[must_use]
    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a single required input key.
    #[must_use]
    pub fn with_require(mut self, key: impl Into<String>) -> Self {
        self.requires.insert(key.into());
        self
    }

    /// Overrides the output key.
    #[must_use]
    pub fn with_produces(mut self, key: impl Into<String>) -> Self {
        self.produces = key.into();
        self
    }

    /// Sets stage-specific parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Validates the descriptor in isolation.
    ///
    /// # Errors
    ///
    /// Returns `PLAN-006-BLANK_NAME` for an empty name and
    /// `PLAN-003-SAME_PHASE_REQUIRE` when the stage requires its own
    /// output key, which no run could ever satisfy.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.name.trim().is_empty() {
            return Err(PlanError::blank_name());
        }
        if self.requires.contains(&self.produces) {
            return Err(PlanError::same_phase_require(&self.name, &self.produces));
        }
        Ok(())
    }
}

/// An ordered group of stages that run concurrently between two barriers.
#[derive(Debug, Clone, Default)]
pub struct Phase {
    /// Optional human-readable label, used in events and logs.
    pub label: Option<String>,
    /// The stages, in declaration order. Declaration order fixes the order
    /// results are merged into the run context.
    pub stages: Vec<StageDescriptor>,
}

impl Phase {
    /// Creates an unlabeled phase.
    #[must_use]
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        Self {
            label: None,
            stages,
        }
    }

    /// Creates a labeled phase.
    #[must_use]
    pub fn labeled(label: impl Into<String>, stages: Vec<StageDescriptor>) -> Self {
        Self {
            label: Some(label.into()),
            stages,
        }
    }

    /// Returns the label, falling back to `phase-<index>`.
    #[must_use]
    pub fn label_or_index(&self, index: usize) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("phase-{index}"))
    }

    /// Iterates the stage names in declaration order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|descriptor| descriptor.name.as_str())
    }

    /// Number of stages in the phase.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the phase has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// A validated, immutable pipeline plan.
///
/// Phases run strictly in order; the stages inside one phase run
/// concurrently against a shared context snapshot.
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    phases: Vec<Phase>,
    policy: PhasePolicy,
    default_timeout: Option<Duration>,
    default_retry: Option<RetryConfig>,
    max_concurrency: Option<usize>,
}

impl Plan {
    /// Starts building a plan.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PlanBuilder {
        PlanBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        phases: Vec<Phase>,
        policy: PhasePolicy,
        default_timeout: Option<Duration>,
        default_retry: Option<RetryConfig>,
        max_concurrency: Option<usize>,
    ) -> Self {
        Self {
            name,
            phases,
            policy,
            default_timeout,
            default_retry,
            max_concurrency,
        }
    }

    /// Returns the plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the phases in execution order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Number of phases.
    #[must_use]
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Total number of stages across all phases.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.phases.iter().map(Phase::len).sum()
    }

    /// The failure policy applied at every phase barrier.
    #[must_use]
    pub const fn policy(&self) -> PhasePolicy {
        self.policy
    }

    /// The plan-wide fallback deadline for stages without their own.
    #[must_use]
    pub const fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// The plan-wide fallback retry policy.
    #[must_use]
    pub const fn default_retry(&self) -> Option<&RetryConfig> {
        self.default_retry.as_ref()
    }

    /// Optional bound on concurrently running stages within a phase.
    #[must_use]
    pub const fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// The deadline that applies to one attempt of the given stage.
    #[must_use]
    pub fn effective_timeout(&self, descriptor: &StageDescriptor) -> Option<Duration> {
        descriptor.timeout.or(self.default_timeout)
    }

    /// The retry policy that applies to the given stage, if any.
    #[must_use]
    pub fn effective_retry<'a>(&'a self, descriptor: &'a StageDescriptor) -> Option<&'a RetryConfig> {
        descriptor.retry.as_ref().or(self.default_retry.as_ref())
    }

    /// Iterates every stage name in phase, then declaration, order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().flat_map(Phase::stage_names)
    }

    /// Returns true if a stage with the given name exists.
    #[must_use]
    pub fn contains_stage(&self, name: &str) -> bool {
        self.stage_names().any(|stage| stage == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;
    use serde_json::json;

    fn noop() -> Arc<dyn Stage> {
        Arc::new(NoOpStage)
    }

    #[test]
    fn test_descriptor_produces_defaults_to_name() {
        let descriptor = StageDescriptor::new("ReviewsResearch", noop());
        assert_eq!(descriptor.name, "ReviewsResearch");
        assert_eq!(descriptor.produces, "ReviewsResearch");
        assert!(descriptor.requires.is_empty());
    }

    #[test]
    fn test_descriptor_builders() {
        let descriptor = StageDescriptor::new("ScriptWriter", noop())
            .with_requires(["ReviewsResearch", "TrendsResearch"])
            .with_produces("script")
            .with_params(json!({"tone": "energetic"}))
            .with_timeout(Duration::from_secs(30))
            .with_retry(RetryConfig::new().with_max_attempts(2));

        assert_eq!(descriptor.requires.len(), 2);
        assert_eq!(descriptor.produces, "script");
        assert_eq!(descriptor.params["tone"], "energetic");
        assert_eq!(descriptor.timeout, Some(Duration::from_secs(30)));
        assert_eq!(descriptor.retry.map(|r| r.max_attempts), Some(2));
    }

    #[test]
    fn test_descriptor_rejects_blank_name() {
        let descriptor = StageDescriptor::new("   ", noop());
        let err = descriptor.validate().unwrap_err();
        assert_eq!(err.diagnostic.code, "PLAN-006-BLANK_NAME");
    }

    #[test]
    fn test_descriptor_rejects_self_require() {
        let descriptor = StageDescriptor::new("ScriptWriter", noop()).with_require("ScriptWriter");
        let err = descriptor.validate().unwrap_err();
        assert_eq!(err.diagnostic.code, "PLAN-003-SAME_PHASE_REQUIRE");
    }

    #[test]
    fn test_phase_label_fallback() {
        let anonymous = Phase::new(vec![StageDescriptor::new("a", noop())]);
        assert_eq!(anonymous.label_or_index(2), "phase-2");

        let labeled = Phase::labeled("research", vec![StageDescriptor::new("a", noop())]);
        assert_eq!(labeled.label_or_index(2), "research");
    }

    #[test]
    fn test_plan_effective_settings_fall_back() {
        let plan = Plan::from_parts(
            "campaign".to_string(),
            vec![Phase::new(vec![StageDescriptor::new("a", noop())])],
            PhasePolicy::Lenient,
            Some(Duration::from_secs(60)),
            Some(RetryConfig::new().with_max_attempts(4)),
            None,
        );

        let plain = &plan.phases()[0].stages[0];
        assert_eq!(plan.effective_timeout(plain), Some(Duration::from_secs(60)));
        assert_eq!(plan.effective_retry(plain).map(|r| r.max_attempts), Some(4));

        let tight = StageDescriptor::new("b", noop())
            .with_timeout(Duration::from_secs(5))
            .with_retry(RetryConfig::new().with_max_attempts(1));
        assert_eq!(plan.effective_timeout(&tight), Some(Duration::from_secs(5)));
        assert_eq!(plan.effective_retry(&tight).map(|r| r.max_attempts), Some(1));
    }

    #[test]
    fn test_plan_stage_lookup() {
        let plan = Plan::from_parts(
            "campaign".to_string(),
            vec![
                Phase::new(vec![
                    StageDescriptor::new("ReviewsResearch", noop()),
                    StageDescriptor::new("TrendsResearch", noop()),
                ]),
                Phase::new(vec![StageDescriptor::new("ScriptWriter", noop())]),
            ],
            PhasePolicy::default(),
            None,
            None,
            None,
        );

        assert_eq!(plan.phase_count(), 2);
        assert_eq!(plan.stage_count(), 3);
        assert!(plan.contains_stage("ScriptWriter"));
        assert!(!plan.contains_stage("VideoGen"));
        let names: Vec<&str> = plan.stage_names().collect();
        assert_eq!(names, ["ReviewsResearch", "TrendsResearch", "ScriptWriter"]);
    }
}
