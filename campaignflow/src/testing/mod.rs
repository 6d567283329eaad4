//! Testing utilities for campaignflow pipelines.
//!
//! This module provides:
//! - Mock stages with call recording
//! - A stage context fixture seeded with upstream outputs
//! - Assertions for stage results and context contents

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_context_keys, assert_failed, assert_failed_with_kind, assert_payload_at, assert_skipped,
    assert_success,
};
pub use fixtures::TestContext;
pub use mocks::{FailingStage, FlakyStage, MockStage, SleepStage, StaticStage};
