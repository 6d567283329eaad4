//! Handoff from a finished run to a deliverable builder.
//!
//! The orchestration core produces context and a record; turning those into
//! a shippable artifact (a rendered video, an ad bundle, a report) is the
//! job of an external [`DeliverableBuilder`]. The core guarantees builders
//! one thing: every key in the handed-off snapshot was merged from a
//! `Success` result, so a builder never has to second-guess its inputs.

use crate::context::ContextSnapshot;
use crate::pipeline::RunReport;
use crate::record::{AbortReason, RunOutcome, RunRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a finished deliverable landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// Locator for the artifact, e.g. a filesystem path or an
    /// object-store URI.
    pub uri: String,
    /// Media type of the artifact, e.g. `video/mp4`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl ArtifactLocation {
    /// Creates a location from a locator string.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            media_type: None,
        }
    }

    /// Sets the media type.
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Why a handoff did not produce an artifact.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The run aborted; there is no complete campaign to build from.
    #[error("cannot build a deliverable from an aborted run: {reason}")]
    RunAborted {
        /// Why the run stopped.
        reason: AbortReason,
    },
    /// The builder itself failed.
    #[error("deliverable builder failed: {0}")]
    Builder(#[from] anyhow::Error),
}

/// Builds a shippable artifact from a completed run.
///
/// Implementations live outside the orchestration core; the core only
/// specifies the seam. Builders receive the final context snapshot and the
/// full record and may consult either. Failures are reported through
/// `anyhow` since the core cannot enumerate what can go wrong inside a
/// renderer or an uploader.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliverableBuilder: Send + Sync {
    /// Assembles the deliverable and returns where it landed.
    async fn build(
        &self,
        context: &ContextSnapshot,
        record: &RunRecord,
    ) -> anyhow::Result<ArtifactLocation>;
}

/// Hands a completed run to a builder.
///
/// Aborted runs are refused outright: their context may be missing upstream
/// keys and their record does not describe a finished campaign.
///
/// # Errors
///
/// Returns [`HandoffError::RunAborted`] when the run did not complete, or
/// [`HandoffError::Builder`] when the builder fails.
pub async fn deliver(
    report: &RunReport,
    builder: &dyn DeliverableBuilder,
) -> Result<ArtifactLocation, HandoffError> {
    if let RunOutcome::Aborted { reason } = report.outcome() {
        return Err(HandoffError::RunAborted {
            reason: reason.clone(),
        });
    }
    let location = builder.build(&report.context, &report.record).await?;
    Ok(location)
}
