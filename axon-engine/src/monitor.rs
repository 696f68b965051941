//! Termination predicates for the recursive loop.

use axon_types::{EngineConfig, EventKind, ExecutionFrame};

/// What the monitor decided about the current frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorVerdict {
    /// No predicate is close to firing.
    Continue,
    /// A predicate is within the warning ratio of firing; the message is
    /// appended to the conversation as a system note.
    Warn(String),
    /// A predicate fired; the run terminates before any further phases.
    Terminate {
        /// Which predicate fired (`max_iterations`, `duplicate_tools`,
        /// `loop_detected`, `error_threshold`).
        reason: String,
        /// The terminal event kind to emit.
        kind: EventKind,
    },
}

/// Examines frames against the termination predicates: depth ceiling,
/// duplicate tool calls, short-period output loops, and the cumulative
/// tool-error rate.
pub struct RecursionMonitor {
    duplicate_threshold: usize,
    loop_window: usize,
    error_rate_threshold: f64,
    warning_ratio: f64,
}

impl RecursionMonitor {
    /// Build a monitor from the engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            duplicate_threshold: config.recursion_duplicate_threshold.max(2),
            loop_window: config.recursion_loop_window.max(2),
            error_rate_threshold: config.recursion_error_rate_threshold,
            warning_ratio: config.recursion_warning_ratio,
        }
    }

    /// Check the frame. Termination wins over warnings; the first warning
    /// found is returned otherwise.
    pub fn check(&self, frame: &ExecutionFrame) -> MonitorVerdict {
        if frame.depth >= frame.max_iterations {
            return MonitorVerdict::Terminate {
                reason: "max_iterations".into(),
                kind: EventKind::MaxIterationsReached,
            };
        }

        if trailing_identical(&frame.tool_call_history) >= self.duplicate_threshold {
            return MonitorVerdict::Terminate {
                reason: "duplicate_tools".into(),
                kind: EventKind::RecursionTerminated,
            };
        }

        if has_short_cycle(&frame.last_outputs, self.loop_window) {
            return MonitorVerdict::Terminate {
                reason: "loop_detected".into(),
                kind: EventKind::RecursionTerminated,
            };
        }

        // A single early failure must not kill the run; the rate predicate
        // needs at least two errors behind it.
        let error_rate = frame.error_count as f64 / (frame.depth + 1) as f64;
        if frame.error_count >= 2 && error_rate >= self.error_rate_threshold {
            return MonitorVerdict::Terminate {
                reason: "error_threshold".into(),
                kind: EventKind::RecursionTerminated,
            };
        }

        // Soft warnings at the configured fraction of each predicate.
        let depth_warn = (frame.max_iterations as f64 * self.warning_ratio).ceil() as u32;
        if frame.max_iterations > 0 && frame.depth + 1 >= depth_warn.max(1) {
            return MonitorVerdict::Warn(format!(
                "Note: approaching the iteration limit ({} of {} used). Work toward a final answer.",
                frame.depth, frame.max_iterations
            ));
        }
        if self.duplicate_threshold > 1
            && trailing_identical(&frame.tool_call_history) >= self.duplicate_threshold - 1
        {
            return MonitorVerdict::Warn(
                "Note: the same tool has been called repeatedly with no new outcome. Try a different approach.".into(),
            );
        }
        if frame.error_count > 0 && error_rate >= self.error_rate_threshold * self.warning_ratio {
            return MonitorVerdict::Warn(
                "Note: a high share of recent tool calls failed. Reconsider the approach before retrying.".into(),
            );
        }

        MonitorVerdict::Continue
    }
}

/// Length of the run of identical entries at the tail of `history`.
fn trailing_identical(history: &[String]) -> usize {
    let Some(last) = history.last() else {
        return 0;
    };
    history.iter().rev().take_while(|name| *name == last).count()
}

/// Whether the tail of `outputs` repeats with period 1 or 2.
fn has_short_cycle(outputs: &[String], window: usize) -> bool {
    let tail: Vec<&String> = outputs.iter().rev().take(window).collect();
    if tail.len() >= 2 && tail[0] == tail[1] && !tail[0].is_empty() {
        return true;
    }
    if tail.len() >= 4 && tail[0] == tail[2] && tail[1] == tail[3] && tail[0] != tail[1] {
        return true;
    }
    false
}
