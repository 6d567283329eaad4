//! Run identity for correlating records, events and output directories.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a single pipeline run.
///
/// The run id is always present and namespaces everything the run touches:
/// record entries, emitted events and the shared output directory. The other
/// ids are optional correlation handles for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,

    /// The request ID (for request-scoped tracking).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    /// The campaign this run belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,

    /// Who or what started the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

impl RunIdentity {
    /// Creates a new identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            request_id: None,
            campaign_id: None,
            initiator: None,
        }
    }

    /// Creates an identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            request_id: None,
            campaign_id: None,
            initiator: None,
        }
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the campaign ID.
    #[must_use]
    pub fn with_campaign_id(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    /// Sets the initiator.
    #[must_use]
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    /// Converts to a JSON object for enriching emitted events.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "request_id": self.request_id.map(|id| id.to_string()),
            "campaign_id": self.campaign_id,
            "initiator": self.initiator,
        })
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}
