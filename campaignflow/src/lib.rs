//! # Campaignflow
//!
//! A phase-oriented orchestration core for multi-stage campaign-generation
//! pipelines.
//!
//! Campaignflow schedules independent research producers concurrently, then
//! chains of dependent analysis, creative and production stages, with
//! support for:
//!
//! - **Phase-barrier execution**: stages in one phase run concurrently
//!   against a shared context snapshot; phases run strictly in sequence
//! - **Append-only run context**: stage outputs accumulate key-by-stage and
//!   are never overwritten, so a plan that builds replays deterministically
//! - **Tagged stage results**: every stage resolves `Success`, `Skipped` or
//!   `Failed`, and a missing upstream input is a skip, never a failure
//! - **Cost accounting**: an atomic ledger totals stage spend and can abort
//!   a run at a budget cap
//! - **Cancellation handling**: one run-level token reaches every in-flight
//!   stage of the current phase
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use campaignflow::prelude::*;
//!
//! let plan = PlanBuilder::new("product-campaign")
//!     .phase(vec![
//!         StageDescriptor::new("ReviewsResearch", reviews_stage),
//!         StageDescriptor::new("TrendsResearch", trends_stage),
//!     ])?
//!     .phase(vec![StageDescriptor::new("ScriptWriter", script_stage)
//!         .with_requires(["ReviewsResearch", "TrendsResearch"])])?
//!     .build()?;
//!
//! let report = run_pipeline(plan, RunConfig::new("trail shoes")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod handoff;
pub mod ledger;
pub mod pipeline;
pub mod record;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancelToken;
    pub use crate::config::RunConfig;
    pub use crate::context::{ContextSnapshot, RunContext, RunIdentity, StageContext};
    pub use crate::errors::{ContextConflictError, PipelineError, PlanError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::handoff::{deliver, ArtifactLocation, DeliverableBuilder, HandoffError};
    pub use crate::ledger::CostLedger;
    pub use crate::pipeline::{
        run_pipeline, Orchestrator, Phase, PhasePolicy, Plan, PlanBuilder, RetryConfig,
        RunReport, StageDescriptor,
    };
    pub use crate::record::{AbortReason, RunOutcome, RunRecord, RunRecordEntry};
    pub use crate::stages::{Cost, Stage, StageError, StageErrorKind, StageResult};
}
