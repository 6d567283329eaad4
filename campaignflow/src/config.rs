//! Uniform run configuration handed to every stage.

use crate::stages::Cost;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Parameters for one pipeline run.
///
/// The config is passed to every stage unchanged; stages read the subset
/// they care about. The budget cap, when set, is registered with the cost
/// ledger at run start and checked after every phase barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The product or subject the campaign is about.
    pub product: String,

    /// Target audience description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Target market or region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,

    /// Desired duration of the creative (e.g. spot length).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    /// Spend ceiling for the whole run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_cap: Option<Cost>,

    /// BCP 47 locale for generated copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Root under which the run's shared output directory is created,
    /// namespaced by run id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_root: Option<PathBuf>,
}

impl RunConfig {
    /// Creates a config for the given product with everything else unset.
    #[must_use]
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            audience: None,
            market: None,
            duration: None,
            budget_cap: None,
            locale: None,
            output_root: None,
        }
    }

    /// Sets the target audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the target market.
    #[must_use]
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    /// Sets the desired creative duration.
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the budget cap.
    #[must_use]
    pub const fn with_budget_cap(mut self, cap: Cost) -> Self {
        self.budget_cap = Some(cap);
        self
    }

    /// Sets the locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Sets the output root directory.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }
}
