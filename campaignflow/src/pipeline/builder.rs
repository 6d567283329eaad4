//! Plan builder with construction-time validation.
//!
//! Every rule is checked as phases are added, so a plan that builds is safe
//! to run: names are unique, output keys have one producer each, and every
//! required key resolves to a strictly earlier phase. That last rule makes
//! the requires/produces graph acyclic by construction.

use super::{Phase, PhasePolicy, Plan, RetryConfig, StageDescriptor};
use crate::errors::PlanError;
use std::collections::HashMap;
use std::time::Duration;

/// Builder for creating validated plans.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    /// The plan name.
    name: String,
    /// Validated phases so far.
    phases: Vec<Phase>,
    /// Output key to producing stage, across all accepted phases.
    producers: HashMap<String, String>,
    /// The failure policy.
    policy: PhasePolicy,
    /// Plan-wide fallback deadline.
    default_timeout: Option<Duration>,
    /// Plan-wide fallback retry policy.
    default_retry: Option<RetryConfig>,
    /// Optional per-phase concurrency bound.
    max_concurrency: Option<usize>,
}

impl PlanBuilder {
    /// Creates a new plan builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends an unlabeled phase.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (duplicate name, unknown
    /// require, same-phase require, etc.)
    pub fn phase(mut self, stages: Vec<StageDescriptor>) -> Result<Self, PlanError> {
        self.add_phase(Phase::new(stages))?;
        Ok(self)
    }

    /// Appends a labeled phase.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn labeled_phase(
        mut self,
        label: impl Into<String>,
        stages: Vec<StageDescriptor>,
    ) -> Result<Self, PlanError> {
        self.add_phase(Phase::labeled(label, stages))?;
        Ok(self)
    }

    /// Appends a phase, validating it against everything accepted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_phase(&mut self, phase: Phase) -> Result<(), PlanError> {
        if phase.is_empty() {
            return Err(PlanError::empty("phase"));
        }

        // Names and output keys must be unique plan-wide, siblings included.
        let mut phase_producers: HashMap<String, String> = HashMap::new();
        for descriptor in &phase.stages {
            descriptor.validate()?;

            if self.contains_stage(&descriptor.name)
                || phase
                    .stages
                    .iter()
                    .filter(|sibling| sibling.name == descriptor.name)
                    .count()
                    > 1
            {
                return Err(PlanError::duplicate_stage(&descriptor.name));
            }

            let producer = self
                .producers
                .get(&descriptor.produces)
                .or_else(|| phase_producers.get(&descriptor.produces));
            if let Some(existing) = producer {
                return Err(PlanError::duplicate_output(
                    &descriptor.produces,
                    vec![existing.clone(), descriptor.name.clone()],
                ));
            }
            phase_producers.insert(descriptor.produces.clone(), descriptor.name.clone());
        }

        // Requires must resolve to a strictly earlier phase.
        for descriptor in &phase.stages {
            for key in &descriptor.requires {
                if phase_producers.contains_key(key) {
                    return Err(PlanError::same_phase_require(&descriptor.name, key));
                }
                if !self.producers.contains_key(key) {
                    return Err(PlanError::unknown_require(&descriptor.name, key));
                }
            }
        }

        self.producers.extend(phase_producers);
        self.phases.push(phase);
        Ok(())
    }

    /// Sets the failure policy for every phase barrier.
    #[must_use]
    pub const fn with_policy(mut self, policy: PhasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the plan-wide fallback deadline for stages without their own.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Sets the plan-wide fallback retry policy.
    #[must_use]
    pub fn with_default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = Some(retry);
        self
    }

    /// Caps the number of stages running concurrently within a phase.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Builds the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if no phases were added.
    pub fn build(self) -> Result<Plan, PlanError> {
        if self.phases.is_empty() {
            return Err(PlanError::empty("plan"));
        }

        Ok(Plan::from_parts(
            self.name,
            self.phases,
            self.policy,
            self.default_timeout,
            self.default_retry,
            self.max_concurrency,
        ))
    }

    /// Returns the plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages accepted so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.phases.iter().map(Phase::len).sum()
    }

    fn contains_stage(&self, name: &str) -> bool {
        self.phases
            .iter()
            .flat_map(Phase::stage_names)
            .any(|stage| stage == name)
    }
}
