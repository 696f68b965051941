//! The append-only event record — the authoritative execution history.

use crate::id::{EventId, FrameId, ThreadId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The enumerated kinds a consumer must recognize.
///
/// Kinds are serialized in snake_case. Readers must tolerate kinds they do
/// not know: unrecognized strings deserialize to [`EventKind::Unknown`]
/// instead of failing, so new kinds never break replay.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new iteration is starting.
    IterationStart,
    /// The iteration finished.
    IterationEnd,
    /// A phase within the iteration is starting.
    PhaseStart,
    /// A phase within the iteration finished.
    PhaseEnd,
    /// Context assembly began.
    ContextAssemblyStart,
    /// Context assembly finished; metadata carries the component decisions.
    ContextAssemblyComplete,
    /// Memory compression produced new summaries.
    CompressionApplied,
    /// Semantic retrieval began.
    RetrievalStart,
    /// Retrieval progress.
    RetrievalProgress,
    /// Retrieval finished.
    RetrievalComplete,
    /// The model call started.
    LlmStart,
    /// An incremental text delta from the model.
    LlmDelta,
    /// The model call finished.
    LlmComplete,
    /// The model requested tool calls.
    LlmToolCalls,
    /// A tool batch is starting.
    ToolCallsStart,
    /// A single tool execution is starting.
    ToolExecutionStart,
    /// Progress from a running tool.
    ToolProgress,
    /// A tool produced a result.
    ToolResult,
    /// A tool produced an error result.
    ToolError,
    /// The tool batch finished; metadata carries aggregate stats.
    ToolCallsComplete,
    /// A successor frame was created (tail recursion).
    Recursion,
    /// The recursion monitor terminated the run.
    RecursionTerminated,
    /// The depth ceiling was reached.
    MaxIterationsReached,
    /// The agent produced its final answer.
    AgentFinish,
    /// A hook paused execution for human input.
    ExecutionInterrupted,
    /// The cancellation token tripped.
    ExecutionCancelled,
    /// An unrecoverable error; metadata carries `{kind, message, recoverable}`.
    Error,
    /// An automatic recovery attempt is starting.
    RecoveryAttempt,
    /// The recovery attempt succeeded.
    RecoverySuccess,
    /// The recovery attempt failed.
    RecoveryFailed,
    /// Forward-compatibility catch-all for kinds this reader does not know.
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Whether this kind terminates a `tt` invocation's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::AgentFinish
                | EventKind::RecursionTerminated
                | EventKind::MaxIterationsReached
                | EventKind::ExecutionInterrupted
                | EventKind::ExecutionCancelled
                | EventKind::Error
        )
    }
}

/// An append-only record emitted by the engine.
///
/// Events are monotonically timestamped per thread and form the history
/// from which any frame can be reconstructed. Unknown fields are ignored
/// on read (forward compatibility).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub event_id: EventId,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The thread this event belongs to.
    pub thread_id: ThreadId,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Which frame emitted it.
    pub frame_id: FrameId,
    /// The emitting frame's recursion depth.
    pub depth: u32,
    /// Payload: text delta, tool name, error message, final answer, etc.
    #[serde(default)]
    pub content: String,
    /// Kind-specific structured data.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Event {
    /// Create an event with empty content and null metadata.
    pub fn new(thread_id: ThreadId, kind: EventKind, frame_id: FrameId, depth: u32) -> Self {
        Self {
            event_id: EventId::generate(),
            timestamp: Utc::now(),
            thread_id,
            kind,
            frame_id,
            depth,
            content: String::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach payload text.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Attach structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Where emitted events go. The engine's implementation journals each
/// event and forwards it to the caller's stream; components that emit
/// events (the tool orchestrator) only see this trait.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn emit(&self, event: Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::ContextAssemblyComplete).unwrap(),
            "\"context_assembly_complete\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::LlmToolCalls).unwrap(),
            "\"llm_tool_calls\""
        );
    }

    #[test]
    fn unknown_kind_does_not_break_deserialization() {
        let kind: EventKind = serde_json::from_str("\"hologram_sync\"").unwrap();
        assert_eq!(kind, EventKind::Unknown);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = Event::new(
            ThreadId::new("t1"),
            EventKind::AgentFinish,
            FrameId::new("f1"),
            0,
        )
        .with_content("done");
        let mut value = serde_json::to_value(&event).unwrap();
        value["field_from_the_future"] = serde_json::json!(42);
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, EventKind::AgentFinish);
        assert_eq!(back.content, "done");
    }

    #[test]
    fn terminal_kinds() {
        assert!(EventKind::AgentFinish.is_terminal());
        assert!(EventKind::RecursionTerminated.is_terminal());
        assert!(EventKind::Error.is_terminal());
        assert!(!EventKind::LlmDelta.is_terminal());
        assert!(!EventKind::ToolResult.is_terminal());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            ThreadId::new("t1"),
            EventKind::ToolResult,
            FrameId::new("f2"),
            3,
        )
        .with_content("file contents")
        .with_metadata(serde_json::json!({"tool": "read_file"}));
        let line = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.depth, 3);
        assert_eq!(back.metadata["tool"], "read_file");
    }
}
