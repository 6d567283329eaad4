//! Plan construction and phase-barrier execution.
//!
//! This module provides:
//! - Stage descriptors grouped into ordered phases
//! - A plan builder with construction-time graph validation
//! - The orchestrator that drives phases through snapshot, barrier and merge
//! - Phase failure policies and retry configuration

mod builder;
mod orchestrator;
mod plan;
mod policy;
mod retry;
mod runner;


pub use builder::PlanBuilder;
pub use orchestrator::{run_pipeline, Orchestrator, RunReport};
pub use plan::{Phase, Plan, StageDescriptor};
pub use policy::{PhasePolicy, PhaseStats};
pub use retry::{
    should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState,
};
pub use runner::StageExecution;
