//! Run context, snapshots and identity.
//!
//! The [`RunContext`] accumulates Success payloads append-only; stages read
//! immutable [`ContextSnapshot`]s through their [`StageContext`].

mod identity;
mod run_context;
mod stage_context;

pub use identity::RunIdentity;
pub use run_context::{ContextSnapshot, RunContext};
pub use stage_context::StageContext;
