//! Error types for the campaignflow orchestration core.
//!
//! Plan construction failures carry structured diagnostics with stable codes;
//! everything that can fail at run time is folded into [`PipelineError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The top-level error type for campaignflow operations.
///
/// Stage-level failures never surface here; they are classified
/// [`StageError`](crate::stages::StageError)s recorded in the run record.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Plan construction or validation failed.
    #[error("{0}")]
    Plan(#[from] PlanError),

    /// An append-only context key was written twice with different payloads.
    #[error("{0}")]
    ContextConflict(#[from] ContextConflictError),

    /// A spawned stage task could not be joined.
    #[error("stage task failed to join: {0}")]
    TaskJoin(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error, e.g. while preparing the run output directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Structured metadata attached to a plan validation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDiagnostic {
    /// Stable error code (e.g. "PLAN-002-UNKNOWN_REQUIRE").
    pub code: String,
    /// Short summary of the problem.
    pub summary: String,
    /// Hint for fixing the plan.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl PlanDiagnostic {
    /// Creates a new diagnostic.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts the diagnostic to a JSON value for events and API layers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            let context: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::json!(v)))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context));
        }
        serde_json::Value::Object(map)
    }
}

/// Error raised when a plan fails construction-time validation.
///
/// Validation runs before any stage is dispatched, so a misconfigured plan
/// never produces a partial run.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PlanError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Structured diagnostic with a stable code.
    pub diagnostic: PlanDiagnostic,
}

impl PlanError {
    /// Two stage descriptors share a name.
    #[must_use]
    pub fn duplicate_stage(name: &str) -> Self {
        Self {
            message: format!("duplicate stage name '{name}'"),
            stages: vec![name.to_string()],
            diagnostic: PlanDiagnostic::new(
                "PLAN-001-DUP_STAGE",
                format!("Stage name '{name}' is declared more than once"),
            )
            .with_fix_hint("Stage names must be unique across the whole plan; rename one of them.")
            .with_context_entry("stage", name),
        }
    }

    /// A requires entry names a key no earlier phase produces.
    #[must_use]
    pub fn unknown_require(stage: &str, key: &str) -> Self {
        Self {
            message: format!("stage '{stage}' requires '{key}', which no earlier phase produces"),
            stages: vec![stage.to_string()],
            diagnostic: PlanDiagnostic::new(
                "PLAN-002-UNKNOWN_REQUIRE",
                format!("Required key '{key}' is not produced by any earlier phase"),
            )
            .with_fix_hint(
                "Every requires entry must match the produces key of a stage in a strictly \
                 earlier phase. Check for typos, or move the producing stage earlier.",
            )
            .with_context_entry("stage", stage)
            .with_context_entry("requires", key),
        }
    }

    /// A requires entry names a key produced within the same phase.
    #[must_use]
    pub fn same_phase_require(stage: &str, key: &str) -> Self {
        Self {
            message: format!("stage '{stage}' requires '{key}', which is produced in the same phase"),
            stages: vec![stage.to_string()],
            diagnostic: PlanDiagnostic::new(
                "PLAN-003-SAME_PHASE_REQUIRE",
                format!("'{key}' is produced by a sibling stage in the same phase"),
            )
            .with_fix_hint(
                "Stages in one phase all see the snapshot taken at phase start, so a \
                 same-phase dependency can never be satisfied. Move the consumer to a \
                 later phase.",
            )
            .with_context_entry("stage", stage)
            .with_context_entry("requires", key),
        }
    }

    /// The plan, or one of its phases, declares no stages.
    #[must_use]
    pub fn empty(what: &str) -> Self {
        Self {
            message: format!("{what} declares no stages"),
            stages: Vec::new(),
            diagnostic: PlanDiagnostic::new("PLAN-004-EMPTY", format!("{what} is empty"))
                .with_fix_hint("Add at least one stage to every phase before building."),
        }
    }

    /// A stage descriptor has an empty or whitespace-only name.
    #[must_use]
    pub fn blank_name() -> Self {
        Self {
            message: "stage name must not be empty".to_string(),
            stages: Vec::new(),
            diagnostic: PlanDiagnostic::new(
                "PLAN-006-BLANK_NAME",
                "A stage descriptor has a blank name",
            )
            .with_fix_hint("Stage names identify record entries and context keys; give every stage a non-empty name."),
        }
    }

    /// Two stage descriptors store their output under the same key.
    #[must_use]
    pub fn duplicate_output(key: &str, stages: Vec<String>) -> Self {
        Self {
            message: format!("output key '{key}' is produced by more than one stage"),
            diagnostic: PlanDiagnostic::new(
                "PLAN-005-DUP_OUTPUT",
                format!("Key '{key}' has multiple producers: {}", stages.join(", ")),
            )
            .with_fix_hint(
                "The run context is append-only, so each produces key needs exactly one \
                 producer. Override produces on one of the stages.",
            )
            .with_context_entry("key", key),
            stages,
        }
    }
}

/// Error raised when merging a different payload under an existing context key.
///
/// Re-merging an identical payload is a no-op, never a conflict.
#[derive(Debug, Clone, Error)]
#[error("context conflict: key '{key}' already holds a different payload")]
pub struct ContextConflictError {
    /// The conflicting key.
    pub key: String,
}

impl ContextConflictError {
    /// Creates a new conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Provides default suggestions for plan diagnostic codes.
pub struct PlanSuggestions;

impl PlanSuggestions {
    /// Gets a suggestion for a given diagnostic code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PLAN-001-DUP_STAGE" => Some(
                "Stage names double as record and event identifiers, so they must be \
                 unique. Suffix duplicates with their phase or market.",
            ),
            "PLAN-002-UNKNOWN_REQUIRE" => Some(
                "Check requires entries against the produces keys of earlier phases. \
                 Typos are the usual culprit.",
            ),
            "PLAN-003-SAME_PHASE_REQUIRE" => Some(
                "Split the phase: producers in one phase, consumers in the next. \
                 Sibling stages never see each other's output.",
            ),
            "PLAN-004-EMPTY" => Some("Add at least one stage to every phase before building."),
            "PLAN-006-BLANK_NAME" => Some("Give every stage a non-empty, non-whitespace name."),
            "PLAN-005-DUP_OUTPUT" => Some(
                "Give one of the producing stages an explicit produces key so the \
                 context keys stay distinct.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_diagnostic_builder() {
        let diagnostic = PlanDiagnostic::new("PLAN-999-TEST", "Test summary")
            .with_fix_hint("Do the thing")
            .with_context_entry("stage", "VideoGen");

        assert_eq!(diagnostic.code, "PLAN-999-TEST");
        assert_eq!(diagnostic.fix_hint, Some("Do the thing".to_string()));
        assert_eq!(diagnostic.context.get("stage"), Some(&"VideoGen".to_string()));
    }

    #[test]
    fn test_plan_diagnostic_to_json() {
        let diagnostic = PlanDiagnostic::new("PLAN-001-DUP_STAGE", "dup").with_fix_hint("rename");
        let json = diagnostic.to_json();

        assert_eq!(json["code"], "PLAN-001-DUP_STAGE");
        assert_eq!(json["fix_hint"], "rename");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn test_unknown_require_error() {
        let err = PlanError::unknown_require("ScriptWriter", "ReviewsResearch");

        assert!(err.to_string().contains("ScriptWriter"));
        assert!(err.to_string().contains("ReviewsResearch"));
        assert_eq!(err.diagnostic.code, "PLAN-002-UNKNOWN_REQUIRE");
        assert_eq!(err.stages, vec!["ScriptWriter".to_string()]);
    }

    #[test]
    fn test_duplicate_output_error() {
        let err = PlanError::duplicate_output(
            "script",
            vec!["ScriptWriter".to_string(), "ScriptRewriter".to_string()],
        );

        assert_eq!(err.diagnostic.code, "PLAN-005-DUP_OUTPUT");
        assert_eq!(err.stages.len(), 2);
    }

    #[test]
    fn test_context_conflict_display() {
        let err = ContextConflictError::new("script");
        assert!(err.to_string().contains("'script'"));
    }

    #[test]
    fn test_pipeline_error_from_serde() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: PipelineError = bad.map(|_| ()).map_err(PipelineError::from).unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }

    #[test]
    fn test_plan_suggestions() {
        assert!(PlanSuggestions::get("PLAN-003-SAME_PHASE_REQUIRE").is_some());
        assert!(PlanSuggestions::get("UNKNOWN").is_none());
    }
}
