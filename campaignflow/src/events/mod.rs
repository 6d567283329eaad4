//! Event sink system for observability.
//!
//! Every run emits a stream of lifecycle events (`run.started`,
//! `phase.completed`, `stage.failed`, ...) through an [`EventSink`]. A
//! process-global default sink is used when a run does not configure its own.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-global default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-global default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-global default event sink.
///
/// Returns a [`NoOpEventSink`] if no sink is set.
#[must_use]
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_sink_defaults_to_noop() {
        clear_event_sink();
        let sink = get_event_sink();
        sink.try_emit("run.started", None);
    }

    #[tokio::test]
    async fn test_set_and_get_sink() {
        let sink: Arc<dyn EventSink> = Arc::new(LoggingEventSink::default());
        set_event_sink(sink);

        let retrieved = get_event_sink();
        retrieved.try_emit("run.completed", Some(serde_json::json!({"outcome": "completed"})));

        clear_event_sink();
    }
}
