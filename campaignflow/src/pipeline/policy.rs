//! Phase failure policy, evaluated at every phase barrier.

use crate::stages::StageResult;
use serde::{Deserialize, Serialize};

/// Decides whether a resolved phase aborts the run.
///
/// Evaluated after every barrier, including the final phase's. A plan
/// carries exactly one policy for all of its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasePolicy {
    /// Abort only when a phase yields zero `Success` results. A phase with
    /// at least one success continues, letting later stages decide whether
    /// they have enough inputs.
    #[default]
    Lenient,
    /// Abort when any stage in the phase resolved `Failed`, or when the
    /// phase yields zero `Success` results.
    Strict,
}

impl PhasePolicy {
    /// Returns true if a phase with the given tallies aborts the run.
    #[must_use]
    pub const fn should_abort(&self, stats: &PhaseStats) -> bool {
        match self {
            Self::Lenient => stats.succeeded == 0,
            Self::Strict => stats.failed > 0 || stats.succeeded == 0,
        }
    }
}

/// Outcome tallies for one resolved phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseStats {
    /// Stages that resolved `Success`.
    pub succeeded: usize,
    /// Stages that resolved `Skipped`.
    pub skipped: usize,
    /// Stages that resolved `Failed`.
    pub failed: usize,
}

impl PhaseStats {
    /// Tallies a phase's resolved results.
    #[must_use]
    pub fn tally<'a>(results: impl IntoIterator<Item = &'a StageResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            match result {
                StageResult::Success { .. } => stats.succeeded += 1,
                StageResult::Skipped { .. } => stats.skipped += 1,
                StageResult::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }

    /// Total stages tallied.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageError;
    use serde_json::json;

    fn mixed_phase() -> Vec<StageResult> {
        vec![
            StageResult::ok(json!({"hook": "spring sale"})),
            StageResult::fail(StageError::transient("rate limited")),
        ]
    }

    #[test]
    fn test_tally_counts_each_tag() {
        let results = vec![
            StageResult::ok(json!({})),
            StageResult::skip("no scenes"),
            StageResult::fail(StageError::permanent("bad input")),
            StageResult::ok(json!({})),
        ];

        let stats = PhaseStats::tally(&results);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_lenient_continues_on_partial_success() {
        let stats = PhaseStats::tally(&mixed_phase());
        assert!(!PhasePolicy::Lenient.should_abort(&stats));
    }

    #[test]
    fn test_strict_aborts_on_any_failure() {
        let stats = PhaseStats::tally(&mixed_phase());
        assert!(PhasePolicy::Strict.should_abort(&stats));
    }

    #[test]
    fn test_lenient_aborts_when_nothing_succeeded() {
        let results = vec![
            StageResult::fail(StageError::permanent("boom")),
            StageResult::skip("missing input"),
        ];
        let stats = PhaseStats::tally(&results);
        assert!(PhasePolicy::Lenient.should_abort(&stats));
    }

    #[test]
    fn test_all_skipped_aborts_under_both_policies() {
        let results = vec![StageResult::skip("no scenes")];
        let stats = PhaseStats::tally(&results);

        assert!(PhasePolicy::Lenient.should_abort(&stats));
        assert!(PhasePolicy::Strict.should_abort(&stats));
    }

    #[test]
    fn test_strict_continues_when_all_succeeded() {
        let results = vec![StageResult::ok(json!({})), StageResult::ok(json!({}))];
        let stats = PhaseStats::tally(&results);
        assert!(!PhasePolicy::Strict.should_abort(&stats));
    }

    #[test]
    fn test_default_policy_is_lenient() {
        assert_eq!(PhasePolicy::default(), PhasePolicy::Lenient);
    }
}
