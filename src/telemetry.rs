//! Telemetry utilities for operation timing and span correlation.

use std::time::Instant;

/// Guard for timing a lobby operation and recording metrics.
///
/// Records operation latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_operation(self.operation, duration);
    }
}

/// Standardized span constructors for lobby observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one matching pass.
    pub fn matching_pass(waiting: usize) -> Span {
        info_span!("matching_pass", waiting = waiting)
    }

    /// Span for work inside one session.
    pub fn session(session_id: &str) -> Span {
        info_span!("session", session = %session_id)
    }

    /// Span for one automated turn.
    pub fn automated_turn(session_id: &str, slot: usize, display_name: &str) -> Span {
        info_span!("automated_turn", session = %session_id, slot = slot, speaker = %display_name)
    }
}
