//! The run record: an ordered, serializable audit trail of one execution.
//!
//! Every dispatched stage appends exactly one entry, in phase then
//! declaration order, whatever its outcome. A record is returned on every
//! path out of a run, aborts included.

use crate::context::RunIdentity;
use crate::errors::PipelineError;
use crate::stages::{Cost, StageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a run stopped before completing every phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum AbortReason {
    /// The failure policy aborted at a phase barrier.
    PhaseFailed {
        /// Index of the phase that tripped the policy.
        phase_index: usize,
    },
    /// The ledger total exceeded the configured budget cap.
    BudgetExceeded {
        /// Ledger total at the barrier where the cap was breached.
        total: Cost,
        /// The configured cap.
        cap: Cost,
    },
    /// The run's cancel token fired.
    Cancelled {
        /// Reason recorded by whoever cancelled, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhaseFailed { phase_index } => {
                write!(f, "phase {phase_index} produced no usable output")
            }
            Self::BudgetExceeded { total, cap } => {
                write!(f, "budget cap {cap} exceeded: total {total}")
            }
            Self::Cancelled {
                reason: Some(reason),
            } => write!(f, "cancelled: {reason}"),
            Self::Cancelled { reason: None } => write!(f, "cancelled"),
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every phase ran and passed its policy check.
    Completed,
    /// The run stopped early. The record still holds every entry up to
    /// and including the aborting phase.
    Aborted {
        /// What stopped the run.
        reason: AbortReason,
    },
}

impl RunOutcome {
    /// Returns true if every phase completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the run aborted.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// The abort reason, when there is one.
    #[must_use]
    pub const fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Self::Completed => None,
            Self::Aborted { reason } => Some(reason),
        }
    }
}

/// One stage's outcome within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecordEntry {
    /// The phase the stage ran in.
    pub phase_index: usize,
    /// The stage name.
    pub stage: String,
    /// The resolved result, tag and all.
    pub result: StageResult,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the final attempt resolved.
    pub finished_at: DateTime<Utc>,
    /// Attempts made. Zero for stages skipped before dispatch.
    pub attempts: u32,
}

impl RunRecordEntry {
    /// Wall-clock duration across all attempts, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Ordered audit trail of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Identity of the run the record belongs to.
    pub identity: RunIdentity,
    /// Name of the executed plan.
    pub plan_name: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run resolved, completed or aborted.
    pub finished_at: DateTime<Utc>,
    /// One entry per dispatched stage, in phase then declaration order.
    pub entries: Vec<RunRecordEntry>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Final ledger total: the sum of all `Success` costs.
    pub total_cost: Cost,
}

impl RunRecord {
    /// Entries belonging to one phase, in declaration order.
    pub fn entries_for_phase(&self, phase_index: usize) -> impl Iterator<Item = &RunRecordEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.phase_index == phase_index)
    }

    /// Looks up the entry for a stage by name.
    #[must_use]
    pub fn entry(&self, stage: &str) -> Option<&RunRecordEntry> {
        self.entries.iter().find(|entry| entry.stage == stage)
    }

    /// Number of `Success` entries.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.result.is_success())
            .count()
    }

    /// Number of `Skipped` entries.
    #[must_use]
    pub fn skip_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.result.is_skipped())
            .count()
    }

    /// Number of `Failed` entries.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.result.is_failed())
            .count()
    }

    /// Wall-clock duration of the whole run, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serializes the record to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, PipelineError> {
        Ok(serde_json::to_value(self)?)
    }
}
