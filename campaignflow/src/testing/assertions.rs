//! Test assertions for stage results and context contents.

use crate::context::ContextSnapshot;
use crate::stages::{StageErrorKind, StageResult};

/// Asserts that the result is `Success`.
pub fn assert_success(result: &StageResult) {
    assert!(result.is_success(), "Expected success, got: {result:?}");
}

/// Asserts that the result is `Skipped` with a reason containing `fragment`.
pub fn assert_skipped(result: &StageResult, fragment: &str) {
    match result.skip_reason() {
        Some(reason) => assert!(
            reason.contains(fragment),
            "Expected skip reason containing '{fragment}', got '{reason}'"
        ),
        None => panic!("Expected skipped, got: {result:?}"),
    }
}

/// Asserts that the result is `Failed`.
pub fn assert_failed(result: &StageResult) {
    assert!(result.is_failed(), "Expected failure, got: {result:?}");
}

/// Asserts that the result is `Failed` with the given error kind.
pub fn assert_failed_with_kind(result: &StageResult, kind: StageErrorKind) {
    match result.error() {
        Some(error) => assert_eq!(
            error.kind, kind,
            "Expected a {kind} failure, got: {result:?}"
        ),
        None => panic!("Expected failure, got: {result:?}"),
    }
}

/// Asserts that a success payload holds `expected` at the JSON pointer.
pub fn assert_payload_at(result: &StageResult, pointer: &str, expected: &serde_json::Value) {
    let Some(payload) = result.payload() else {
        panic!("Expected success with payload, got: {result:?}");
    };
    assert_eq!(
        payload.pointer(pointer),
        Some(expected),
        "Payload mismatch at '{pointer}' in {payload}"
    );
}

/// Asserts that the snapshot holds exactly `expected` keys, in merge order.
pub fn assert_context_keys(snapshot: &ContextSnapshot, expected: &[&str]) {
    let actual: Vec<&str> = snapshot.keys().collect();
    assert_eq!(actual, expected, "Context keys differ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::stages::StageError;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_assert_success() {
        assert_success(&StageResult::ok(json!({})));
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_success_panics_on_failure() {
        assert_success(&StageResult::fail(StageError::permanent("boom")));
    }

    #[test]
    fn test_assert_skipped_matches_fragment() {
        assert_skipped(&StageResult::skip("no scenes in script"), "no scenes");
    }

    #[test]
    #[should_panic(expected = "Expected skipped")]
    fn test_assert_skipped_panics_on_success() {
        assert_skipped(&StageResult::ok(json!({})), "anything");
    }

    #[test]
    fn test_assert_failed_with_kind() {
        let result = StageResult::fail(StageError::timeout(Duration::from_millis(250)));
        assert_failed(&result);
        assert_failed_with_kind(&result, StageErrorKind::Timeout);
    }

    #[test]
    fn test_assert_payload_at() {
        let result = StageResult::ok(json!({"script": {"scenes": [1, 2]}}));
        assert_payload_at(&result, "/script/scenes/1", &json!(2));
    }

    #[test]
    fn test_assert_context_keys_in_merge_order() {
        let mut context = RunContext::new();
        let _ = context.merge("b", json!(1));
        let _ = context.merge("a", json!(2));

        assert_context_keys(&context.snapshot(), &["b", "a"]);
    }
}
