//! Atomic cost accounting for a run.

use crate::stages::Cost;
use std::sync::atomic::{AtomicU64, Ordering};

/// The run-wide cost accumulator.
///
/// The ledger is the only object sibling stages mutate concurrently: the
/// stage runner charges it the moment an attempt resolves Success, from
/// whichever task finishes first. Accumulation is a single atomic, the total
/// never decreases, and charges saturate instead of wrapping.
#[derive(Debug, Default)]
pub struct CostLedger {
    total_micros: AtomicU64,
    cap: Option<Cost>,
}

impl CostLedger {
    /// Creates a ledger with an optional budget cap.
    #[must_use]
    pub const fn new(cap: Option<Cost>) -> Self {
        Self {
            total_micros: AtomicU64::new(0),
            cap,
        }
    }

    /// Creates a ledger without a budget cap.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(None)
    }

    /// Creates a ledger with a budget cap.
    #[must_use]
    pub const fn with_cap(cap: Cost) -> Self {
        Self::new(Some(cap))
    }

    /// Atomically adds a cost and returns the new total.
    pub fn charge(&self, cost: Cost) -> Cost {
        let previous = self
            .total_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                Some(total.saturating_add(cost.micros()))
            })
            .unwrap_or_else(|total| total);
        Cost::from_micros(previous.saturating_add(cost.micros()))
    }

    /// Returns the current total.
    #[must_use]
    pub fn total(&self) -> Cost {
        Cost::from_micros(self.total_micros.load(Ordering::SeqCst))
    }

    /// Returns the budget cap, if one was registered.
    #[must_use]
    pub const fn cap(&self) -> Option<Cost> {
        self.cap
    }

    /// Returns true if the total has exceeded the cap. A total exactly at
    /// the cap is still within budget.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cap.is_some_and(|cap| self.total() > cap)
    }

    /// Returns the budget left under the cap, or None when unbounded.
    /// Saturates at zero once the cap is exceeded.
    #[must_use]
    pub fn remaining(&self) -> Option<Cost> {
        self.cap
            .map(|cap| Cost::from_micros(cap.micros().saturating_sub(self.total().micros())))
    }
}
