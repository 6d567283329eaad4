//! Phase-barrier orchestration over a validated plan.
//!
//! The orchestrator walks phases in declaration order. Within a phase every
//! stage is spawned against the same context snapshot; the barrier awaits all
//! of them before anything downstream observes their output. Success payloads
//! merge into the run context in declaration order, so replays of the same
//! plan produce the same key order regardless of which sibling finished first.
//!
//! After each barrier the orchestrator applies three gates, in order: the
//! budget cap, external cancellation, then the plan's failure policy. The
//! first gate that trips aborts the run; later phases are never dispatched.
//! Every path out of [`Orchestrator::run`] carries the full [`RunRecord`],
//! aborted runs included.

use super::plan::Plan;
use super::policy::PhaseStats;
use super::runner::run_stage;
use crate::cancellation::CancelToken;
use crate::config::RunConfig;
use crate::context::{ContextSnapshot, RunContext, RunIdentity, StageContext};
use crate::errors::PipelineError;
use crate::events::{get_event_sink, EventSink};
use crate::ledger::CostLedger;
use crate::record::{AbortReason, RunOutcome, RunRecord, RunRecordEntry};
use crate::stages::{Cost, StageResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Everything a finished run hands back: the audit record and the final
/// context snapshot for deliverable builders.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Ordered audit trail. Present on every exit path, aborts included.
    pub record: RunRecord,
    /// The run context as of the last completed barrier.
    pub context: ContextSnapshot,
}

impl RunReport {
    /// How the run ended.
    #[must_use]
    pub const fn outcome(&self) -> &RunOutcome {
        &self.record.outcome
    }

    /// Returns `true` when every phase ran to completion.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.record.outcome.is_completed()
    }

    /// Final ledger total across all successful stages.
    #[must_use]
    pub const fn total_cost(&self) -> Cost {
        self.record.total_cost
    }
}

/// Drives a [`Plan`] from the first phase to a [`RunReport`].
pub struct Orchestrator {
    plan: Plan,
    event_sink: Arc<dyn EventSink>,
    cancel_token: Arc<CancelToken>,
    identity: Option<RunIdentity>,
}

impl Orchestrator {
    /// Creates an orchestrator with the process-global event sink and a
    /// fresh cancellation token.
    #[must_use]
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            event_sink: get_event_sink(),
            cancel_token: CancelToken::new(),
            identity: None,
        }
    }

    /// Replaces the event sink for this orchestrator.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Shares an externally held cancellation token with the run.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancelToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Pins the run identity instead of minting one per run.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// The token that cancels this orchestrator's runs.
    #[must_use]
    pub const fn cancel_token(&self) -> &Arc<CancelToken> {
        &self.cancel_token
    }

    /// The plan this orchestrator executes.
    #[must_use]
    pub const fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Executes the plan to completion or abort.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure faults: a stage task that
    /// failed to join, a context merge conflict, or an output directory that
    /// could not be created. Stage failures, budget overruns and
    /// cancellations are not errors; they resolve to an
    /// [`Aborted`](RunOutcome::Aborted) outcome inside the report.
    pub async fn run(&self, config: RunConfig) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let identity = self.identity.clone().unwrap_or_default();
        let config = Arc::new(config);
        let ledger = Arc::new(CostLedger::new(config.budget_cap));
        let mut context = RunContext::new();
        let mut entries: Vec<RunRecordEntry> = Vec::with_capacity(self.plan.stage_count());

        // Per-run working directory, namespaced by run id so concurrent runs
        // of the same plan never collide.
        let output_dir = match config.output_root.as_ref() {
            Some(root) => {
                let dir = root.join(identity.run_id.to_string());
                tokio::fs::create_dir_all(&dir).await?;
                Some(dir)
            }
            None => None,
        };

        {
            let token = Arc::clone(&self.cancel_token);
            let run_id = identity.run_id;
            self.cancel_token.on_cancel(move || {
                let reason = token.reason().unwrap_or_default();
                warn!(run_id = %run_id, reason = %reason, "run cancellation requested");
            });
        }

        info!(
            run_id = %identity.run_id,
            plan = %self.plan.name(),
            phases = self.plan.phase_count(),
            "starting run"
        );
        self.try_emit(
            &identity,
            "run.started",
            json!({
                "plan": self.plan.name(),
                "product": config.product,
                "phases": self.plan.phase_count(),
                "stages": self.plan.stage_count(),
            }),
        );

        let limiter = self
            .plan
            .max_concurrency()
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let mut outcome = RunOutcome::Completed;

        'phases: for (phase_index, phase) in self.plan.phases().iter().enumerate() {
            context.advance_to_phase(phase_index);
            let snapshot = context.snapshot();
            let label = phase.label_or_index(phase_index);

            self.try_emit(
                &identity,
                "phase.started",
                json!({
                    "phase_index": phase_index,
                    "label": label,
                    "stages": phase.len(),
                }),
            );

            // Fan out: every stage in the phase sees the same snapshot.
            let mut handles = Vec::with_capacity(phase.len());
            for descriptor in &phase.stages {
                let mut stage_ctx =
                    StageContext::new(&descriptor.name, snapshot.clone(), Arc::clone(&config))
                        .with_params(descriptor.params.clone())
                        .with_identity(identity.clone())
                        .with_ledger(Arc::clone(&ledger))
                        .with_cancel_token(Arc::clone(&self.cancel_token))
                        .with_event_sink(Arc::clone(&self.event_sink));
                if let Some(dir) = &output_dir {
                    stage_ctx = stage_ctx.with_output_dir(dir.clone());
                }

                let descriptor = descriptor.clone();
                let deadline = self.plan.effective_timeout(&descriptor);
                let retry = self.plan.effective_retry(&descriptor).cloned();
                let limiter = limiter.clone();

                handles.push(tokio::spawn(async move {
                    // Permit held for the whole resolution; the deadline only
                    // starts counting once the stage is actually dispatched.
                    let _permit = match limiter {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    run_stage(descriptor, stage_ctx, deadline, retry).await
                }));
            }

            // Barrier: nothing past this point happens until every sibling
            // has resolved. join_all yields results in declaration order.
            let mut executions = Vec::with_capacity(handles.len());
            for joined in futures::future::join_all(handles).await {
                match joined {
                    Ok(execution) => executions.push(execution),
                    Err(e) => {
                        self.cancel_token.cancel("stage task failed to join");
                        return Err(PipelineError::TaskJoin(e.to_string()));
                    }
                }
            }

            let stats = PhaseStats::tally(executions.iter().map(|e| &e.result));

            // Merge in declaration order, not completion order.
            for (descriptor, execution) in phase.stages.iter().zip(&executions) {
                if let StageResult::Success { payload, .. } = &execution.result {
                    context.merge(&descriptor.produces, payload.clone())?;
                }
            }

            for (descriptor, execution) in phase.stages.iter().zip(executions) {
                entries.push(RunRecordEntry {
                    phase_index,
                    stage: descriptor.name.clone(),
                    result: execution.result,
                    started_at: execution.started_at,
                    finished_at: execution.finished_at,
                    attempts: execution.attempts,
                });
            }

            self.try_emit(
                &identity,
                "phase.completed",
                json!({
                    "phase_index": phase_index,
                    "label": label,
                    "succeeded": stats.succeeded,
                    "skipped": stats.skipped,
                    "failed": stats.failed,
                    "ledger_total": ledger.total().as_dollars(),
                }),
            );

            // Gate 1: budget. An exceeded cap aborts regardless of policy.
            let total = ledger.total();
            if let Some(cap) = ledger.cap() {
                if total > cap {
                    self.cancel_token
                        .cancel(format!("budget cap {cap} exceeded: {total}"));
                    outcome = RunOutcome::Aborted {
                        reason: AbortReason::BudgetExceeded { total, cap },
                    };
                    break 'phases;
                }
            }

            // Gate 2: external cancellation. Checked before the policy so a
            // cancelled phase reports the cancel, not the failures it caused.
            if self.cancel_token.is_cancelled() {
                outcome = RunOutcome::Aborted {
                    reason: AbortReason::Cancelled {
                        reason: self.cancel_token.reason(),
                    },
                };
                break 'phases;
            }

            // Gate 3: failure policy, applied uniformly to every phase,
            // the last one included.
            if self.plan.policy().should_abort(&stats) {
                self.cancel_token.cancel(format!(
                    "phase {phase_index} produced no usable output under {:?} policy",
                    self.plan.policy()
                ));
                outcome = RunOutcome::Aborted {
                    reason: AbortReason::PhaseFailed { phase_index },
                };
                break 'phases;
            }
        }

        let finished_at = Utc::now();
        let record = RunRecord {
            identity,
            plan_name: self.plan.name().to_string(),
            started_at,
            finished_at,
            entries,
            outcome,
            total_cost: ledger.total(),
        };

        match &record.outcome {
            RunOutcome::Completed => {
                info!(
                    run_id = %record.identity.run_id,
                    total_cost = %record.total_cost,
                    duration_ms = record.duration_ms(),
                    "run completed"
                );
                self.try_emit(
                    &record.identity,
                    "run.completed",
                    json!({
                        "phases": self.plan.phase_count(),
                        "total_cost": record.total_cost.as_dollars(),
                        "duration_ms": record.duration_ms(),
                    }),
                );
            }
            RunOutcome::Aborted { reason } => {
                warn!(
                    run_id = %record.identity.run_id,
                    reason = %reason,
                    total_cost = %record.total_cost,
                    "run aborted"
                );
                self.try_emit(
                    &record.identity,
                    "run.aborted",
                    json!({
                        "reason": reason,
                        "total_cost": record.total_cost.as_dollars(),
                        "duration_ms": record.duration_ms(),
                    }),
                );
            }
        }

        Ok(RunReport {
            record,
            context: context.snapshot(),
        })
    }

    fn try_emit(&self, identity: &RunIdentity, event_type: &str, mut data: serde_json::Value) {
        if let Some(map) = data.as_object_mut() {
            map.insert("run_id".to_string(), json!(identity.run_id.to_string()));
        }
        self.event_sink.try_emit(event_type, Some(data));
    }
}

/// Runs a plan with default collaborators and returns the report.
///
/// Convenience wrapper over [`Orchestrator`] for callers that need no
/// custom sink, token or identity.
///
/// # Errors
///
/// See [`Orchestrator::run`].
pub async fn run_pipeline(plan: Plan, config: RunConfig) -> Result<RunReport, PipelineError> {
    Orchestrator::new(plan).run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{PhasePolicy, PlanBuilder, StageDescriptor};
    use crate::testing::{assert_context_keys, MockStage, SleepStage, StaticStage};
    use serde_json::json;

    fn single_stage_plan() -> Plan {
        PlanBuilder::new("unit")
            .phase(vec![StageDescriptor::new(
                "hook",
                Arc::new(StaticStage::new(json!({"text": "buy now"}))),
            )])
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_phase_run_completes() {
        let report = run_pipeline(single_stage_plan(), RunConfig::new("demo product"))
            .await
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.record.entries.len(), 1);
        assert_eq!(report.record.entries[0].stage, "hook");
        assert_eq!(report.record.entries[0].phase_index, 0);
        assert_eq!(report.context.get("hook").unwrap()["text"], "buy now");
    }

    #[tokio::test]
    async fn test_merge_follows_declaration_order() {
        // The slower first sibling must still land first in the context.
        let plan = PlanBuilder::new("ordering")
            .phase(vec![
                StageDescriptor::new("slow", Arc::new(SleepStage::with_delay_ms(30))),
                StageDescriptor::new("fast", Arc::new(StaticStage::new(json!("quick")))),
            ])
            .unwrap()
            .build()
            .unwrap();

        let report = run_pipeline(plan, RunConfig::new("demo")).await.unwrap();

        assert!(report.is_completed());
        assert_context_keys(&report.context, &["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_budget_abort_never_dispatches_later_phases() {
        let downstream = Arc::new(MockStage::new());
        let plan = PlanBuilder::new("budgeted")
            .phase(vec![StageDescriptor::new(
                "spender",
                Arc::new(StaticStage::new(json!("pricey")).with_cost(Cost::from_dollars(7.0))),
            )])
            .unwrap()
            .phase(vec![StageDescriptor::new(
                "later",
                Arc::clone(&downstream) as Arc<dyn crate::stages::Stage>,
            )])
            .unwrap()
            .build()
            .unwrap();

        let config = RunConfig::new("demo").with_budget_cap(Cost::from_dollars(5.0));
        let report = run_pipeline(plan, config).await.unwrap();

        match report.outcome() {
            RunOutcome::Aborted {
                reason: AbortReason::BudgetExceeded { total, cap },
            } => {
                assert_eq!(*total, Cost::from_dollars(7.0));
                assert_eq!(*cap, Cost::from_dollars(5.0));
            }
            other => panic!("expected budget abort, got {other:?}"),
        }
        assert_eq!(report.record.entries.len(), 1);
        assert_eq!(downstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancel_reason() {
        let plan = PlanBuilder::new("cancellable")
            .phase(vec![StageDescriptor::new(
                "slow",
                Arc::new(SleepStage::with_delay_ms(5_000)),
            )])
            .unwrap()
            .build()
            .unwrap();

        let orchestrator = Orchestrator::new(plan);
        let token = Arc::clone(orchestrator.cancel_token());
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel("operator hit stop");
        });

        let report = orchestrator.run(RunConfig::new("demo")).await.unwrap();

        match report.outcome() {
            RunOutcome::Aborted {
                reason: AbortReason::Cancelled { reason },
            } => assert_eq!(reason.as_deref(), Some("operator hit stop")),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_strict_policy_aborts_on_single_failure() {
        let downstream = Arc::new(MockStage::new());
        let plan = PlanBuilder::new("strict")
            .phase(vec![
                StageDescriptor::new("good", Arc::new(StaticStage::new(json!("fine")))),
                StageDescriptor::new("bad", Arc::new(crate::testing::FailingStage::new("no quota"))),
            ])
            .unwrap()
            .phase(vec![StageDescriptor::new(
                "later",
                Arc::clone(&downstream) as Arc<dyn crate::stages::Stage>,
            )])
            .unwrap()
            .with_policy(PhasePolicy::Strict)
            .build()
            .unwrap();

        let report = run_pipeline(plan, RunConfig::new("demo")).await.unwrap();

        match report.outcome() {
            RunOutcome::Aborted {
                reason: AbortReason::PhaseFailed { phase_index },
            } => assert_eq!(*phase_index, 0),
            other => panic!("expected phase failure abort, got {other:?}"),
        }
        // The failing phase is still fully recorded.
        assert_eq!(report.record.entries.len(), 2);
        assert_eq!(downstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_events_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator =
            Orchestrator::new(single_stage_plan()).with_event_sink(Arc::clone(&sink) as Arc<dyn EventSink>);

        orchestrator.run(RunConfig::new("demo")).await.unwrap();

        let types: Vec<String> = sink.events().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            types,
            vec![
                "run.started",
                "phase.started",
                "stage.started",
                "stage.completed",
                "phase.completed",
                "run.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_pinned_identity_flows_into_record() {
        let identity = RunIdentity::new().with_campaign_id("summer-launch");
        let orchestrator =
            Orchestrator::new(single_stage_plan()).with_identity(identity.clone());

        let report = orchestrator.run(RunConfig::new("demo")).await.unwrap();

        assert_eq!(report.record.identity.run_id, identity.run_id);
        assert_eq!(
            report.record.identity.campaign_id.as_deref(),
            Some("summer-launch")
        );
    }
}
