//! Side-channel failure reporting.
//!
//! [`Chain::image_at`](crate::chain::Chain::image_at) returns errors to
//! its caller, but the UI also needs to show a per-stage error overlay
//! even when the caller only checks the boolean outcome. The sink is
//! that side channel: one report per failing stage, stage-scoped, never
//! aborting traversal of the rest of the chain.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::StageError;

/// Receives per-stage failures without affecting sibling stages.
pub trait ErrorSink: Send + Sync {
    /// Record the most recent error for a stage.
    fn report(&self, stage_index: usize, error: &StageError);

    /// Clear the recorded error for a stage after it recomputes
    /// successfully. Default: nothing to clear.
    fn clear(&self, stage_index: usize) {
        let _ = stage_index;
    }
}

/// A sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ErrorSink for NullSink {
    fn report(&self, _stage_index: usize, _error: &StageError) {}
}

/// A sink that keeps the most recent error message per stage.
///
/// Shareable across threads; the host hands one to the UI for overlay
/// rendering and to tests for assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    latest: Mutex<HashMap<usize, StageError>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent error recorded for a stage, if any.
    #[must_use]
    pub fn error_for(&self, stage_index: usize) -> Option<StageError> {
        self.latest
            .lock()
            .ok()
            .and_then(|map| map.get(&stage_index).cloned())
    }

    /// Number of stages currently holding an error.
    #[must_use]
    pub fn failing_stage_count(&self) -> usize {
        self.latest.lock().map(|map| map.len()).unwrap_or(0)
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, stage_index: usize, error: &StageError) {
        if let Ok(mut map) = self.latest.lock() {
            map.insert(stage_index, error.clone());
        }
    }

    fn clear(&self, stage_index: usize) {
        if let Ok(mut map) = self.latest.lock() {
            map.remove(&stage_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_keeps_latest_per_stage() {
        let sink = CollectingSink::new();
        sink.report(2, &StageError::UpstreamUnavailable);
        sink.report(
            2,
            &StageError::Filter {
                message: "later".to_string(),
            },
        );
        assert_eq!(
            sink.error_for(2),
            Some(StageError::Filter {
                message: "later".to_string()
            }),
        );
    }

    #[test]
    fn clear_is_stage_scoped() {
        let sink = CollectingSink::new();
        sink.report(1, &StageError::UpstreamUnavailable);
        sink.report(2, &StageError::UpstreamUnavailable);
        sink.clear(1);
        assert!(sink.error_for(1).is_none());
        assert!(sink.error_for(2).is_some());
        assert_eq!(sink.failing_stage_count(), 1);
    }

    #[test]
    fn null_sink_accepts_reports() {
        NullSink.report(0, &StageError::EmptyInput);
        NullSink.clear(0);
    }
}
