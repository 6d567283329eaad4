//! Append-only run context and the immutable snapshots stages read.

use crate::errors::ContextConflictError;
use std::collections::HashMap;
use std::sync::Arc;

/// The accumulated outputs of a run, keyed by produces key.
///
/// The context is append-only: a key is written at most once, by the
/// orchestrator, after a phase barrier. Merging the exact payload a key
/// already holds is a no-op, so replaying a phase's merge is idempotent;
/// merging a different payload is a conflict. Every key present corresponds
/// to a Success result.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    values: Arc<HashMap<String, serde_json::Value>>,
    order: Arc<Vec<String>>,
    phase_index: usize,
}

impl RunContext {
    /// Creates an empty context at phase zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase index. It never decreases.
    #[must_use]
    pub const fn phase_index(&self) -> usize {
        self.phase_index
    }

    /// Advances the phase index. Calls with a smaller index are ignored,
    /// keeping the index monotonic.
    pub fn advance_to_phase(&mut self, phase_index: usize) {
        self.phase_index = self.phase_index.max(phase_index);
    }

    /// Takes an immutable snapshot of the current state.
    ///
    /// Snapshots share storage with the context until the next merge, so
    /// taking one per phase is cheap regardless of payload size.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            values: Arc::clone(&self.values),
            order: Arc::clone(&self.order),
            phase_index: self.phase_index,
        }
    }

    /// Merges a payload under a key.
    ///
    /// Returns `Ok(true)` when the key was newly written, `Ok(false)` when
    /// the identical payload was already present.
    ///
    /// # Errors
    ///
    /// Returns [`ContextConflictError`] when the key already holds a
    /// different payload.
    pub fn merge(
        &mut self,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<bool, ContextConflictError> {
        match self.values.get(key) {
            Some(existing) if *existing == payload => Ok(false),
            Some(_) => Err(ContextConflictError::new(key)),
            None => {
                Arc::make_mut(&mut self.values).insert(key.to_string(), payload);
                Arc::make_mut(&mut self.order).push(key.to_string());
                Ok(true)
            }
        }
    }

    /// Returns the payload under a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the keys in merge order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Returns the number of merged keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no key has been merged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the context to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .order
            .iter()
            .filter_map(|key| self.values.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// An immutable view of the run context, taken at phase start.
///
/// All stages of a phase share the same snapshot, which is why a stage can
/// only ever observe output from strictly earlier phases.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    values: Arc<HashMap<String, serde_json::Value>>,
    order: Arc<Vec<String>>,
    phase_index: usize,
}

impl ContextSnapshot {
    /// Creates an empty snapshot at phase zero, for tests and fixtures.
    #[must_use]
    pub fn empty() -> Self {
        RunContext::new().snapshot()
    }

    /// Returns the phase index at which the snapshot was taken.
    #[must_use]
    pub const fn phase_index(&self) -> usize {
        self.phase_index
    }

    /// Returns the payload under a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the keys in merge order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Returns the number of visible keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is visible yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts the snapshot to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .order
            .iter()
            .filter_map(|key| self.values.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_and_get() {
        let mut ctx = RunContext::new();
        let inserted = ctx.merge("ReviewsResearch", json!({"themes": ["battery"]})).unwrap();

        assert!(inserted);
        assert_eq!(ctx.get("ReviewsResearch"), Some(&json!({"themes": ["battery"]})));
        assert!(ctx.contains("ReviewsResearch"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_merge_is_append_only() {
        let mut ctx = RunContext::new();
        ctx.merge("script", json!("v1")).unwrap();

        let err = ctx.merge("script", json!("v2")).unwrap_err();
        assert_eq!(err.key, "script");
        assert_eq!(ctx.get("script"), Some(&json!("v1")));
    }

    #[test]
    fn test_merge_identical_payload_is_noop() {
        let mut ctx = RunContext::new();
        assert!(ctx.merge("script", json!("v1")).unwrap());
        assert!(!ctx.merge("script", json!("v1")).unwrap());

        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.keys().count(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_merges() {
        let mut ctx = RunContext::new();
        ctx.merge("a", json!(1)).unwrap();

        let snapshot = ctx.snapshot();
        ctx.merge("b", json!(2)).unwrap();

        assert!(snapshot.contains("a"));
        assert!(!snapshot.contains("b"));
        assert!(ctx.contains("b"));
    }

    #[test]
    fn test_phase_index_is_monotonic() {
        let mut ctx = RunContext::new();
        assert_eq!(ctx.phase_index(), 0);

        ctx.advance_to_phase(2);
        assert_eq!(ctx.phase_index(), 2);

        ctx.advance_to_phase(1);
        assert_eq!(ctx.phase_index(), 2);

        assert_eq!(ctx.snapshot().phase_index(), 2);
    }

    #[test]
    fn test_keys_preserve_merge_order() {
        let mut ctx = RunContext::new();
        ctx.merge("zeta", json!(1)).unwrap();
        ctx.merge("alpha", json!(2)).unwrap();
        ctx.merge("mid", json!(3)).unwrap();

        let keys: Vec<&str> = ctx.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_to_json() {
        let mut ctx = RunContext::new();
        ctx.merge("script", json!({"scenes": 2})).unwrap();

        let json = ctx.to_json();
        assert_eq!(json["script"]["scenes"], 2);

        let snapshot_json = ctx.snapshot().to_json();
        assert_eq!(snapshot_json, json);
    }
}
