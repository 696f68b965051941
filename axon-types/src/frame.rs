//! The immutable execution frame — one logical recursion level.

use crate::context::ContextMetadata;
use crate::error::FrameError;
use crate::id::FrameId;
use crate::message::Message;
use crate::tool::{ToolCall, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where in its iteration a frame currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Freshly constructed, nothing has run yet.
    Initial,
    /// The context assembler is building the model's context.
    ContextAssembly,
    /// The model call is in flight.
    LlmCall,
    /// Deciding whether tools are needed.
    Decision,
    /// The tool batch is executing.
    ToolExecution,
    /// A successor frame has been created.
    Recursion,
    /// The run finished with a final answer.
    Completed,
    /// The run failed.
    Error,
}

/// Size bound on the rolling `tool_call_history` / `last_outputs` windows.
pub const ROLLING_WINDOW: usize = 10;

/// Version written into checkpoint envelopes.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEnvelope {
    version: u32,
    frame: ExecutionFrame,
}

/// One logical recursion level. Successive frames form a linked list via
/// `parent_frame_id`.
///
/// Frames are never mutated after construction — the `with_*` operations
/// and [`next_frame`](ExecutionFrame::next_frame) are the only ways to
/// evolve state, and each returns a new frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFrame {
    /// Unique identifier for this frame.
    pub frame_id: FrameId,
    /// Previous frame in the recursion chain (None at the root).
    pub parent_frame_id: Option<FrameId>,
    /// 0-based recursion depth.
    pub depth: u32,
    /// Where in its iteration this frame is.
    pub phase: Phase,
    /// Ordered conversation history feeding this iteration's model call.
    pub messages: Vec<Message>,
    /// Assembled system/context material handed to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_snapshot: Option<String>,
    /// Token counts and per-component decisions from assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_metadata: Option<ContextMetadata>,
    /// Text returned by this iteration's model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<String>,
    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_tool_calls: Vec<ToolCall>,
    /// Results from executing those calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    /// Hard ceiling on depth.
    pub max_iterations: u32,
    /// Rolling window of recently requested tool names.
    #[serde(default)]
    pub tool_call_history: Vec<String>,
    /// Cumulative tool errors in this run.
    #[serde(default)]
    pub error_count: u32,
    /// Rolling window of recent assistant outputs.
    #[serde(default)]
    pub last_outputs: Vec<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

fn push_bounded(window: &mut Vec<String>, value: String) {
    window.push(value);
    if window.len() > ROLLING_WINDOW {
        let excess = window.len() - ROLLING_WINDOW;
        window.drain(..excess);
    }
}

impl ExecutionFrame {
    /// Construct the depth-0 frame for a fresh run.
    pub fn initial(prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            frame_id: FrameId::generate(),
            parent_frame_id: None,
            depth: 0,
            phase: Phase::Initial,
            messages: vec![Message::user(prompt)],
            context_snapshot: None,
            context_metadata: None,
            llm_response: None,
            llm_tool_calls: vec![],
            tool_results: vec![],
            max_iterations,
            tool_call_history: vec![],
            error_count: 0,
            last_outputs: vec![],
            timestamp: Utc::now(),
        }
    }

    /// Construct the depth-0 frame from an existing conversation.
    pub fn from_messages(messages: Vec<Message>, max_iterations: u32) -> Self {
        Self {
            messages,
            ..Self::initial("", max_iterations)
        }
    }

    /// A copy of this frame in the given phase.
    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }

    /// A copy of this frame carrying the assembled context.
    pub fn with_context(&self, snapshot: String, metadata: ContextMetadata) -> Self {
        Self {
            phase: Phase::ContextAssembly,
            context_snapshot: Some(snapshot),
            context_metadata: Some(metadata),
            ..self.clone()
        }
    }

    /// A copy of this frame carrying the model's response. The response
    /// text enters `last_outputs` and each requested tool name enters
    /// `tool_call_history` (both clamped to [`ROLLING_WINDOW`]).
    pub fn with_llm_response(&self, text: String, calls: Vec<ToolCall>) -> Self {
        let mut frame = self.clone();
        frame.phase = Phase::LlmCall;
        push_bounded(&mut frame.last_outputs, text.clone());
        for call in &calls {
            push_bounded(&mut frame.tool_call_history, call.name.clone());
        }
        frame.llm_response = Some(text);
        frame.llm_tool_calls = calls;
        frame
    }

    /// A copy of this frame carrying the batch's tool results. When
    /// `had_error` is set, `error_count` grows by the number of failed
    /// results not already present (resumed runs merge partial batches).
    pub fn with_tool_results(&self, results: Vec<ToolResult>, had_error: bool) -> Self {
        let mut frame = self.clone();
        frame.phase = Phase::ToolExecution;
        if had_error {
            let prior = frame.tool_results.iter().filter(|r| r.is_error).count();
            let now = results.iter().filter(|r| r.is_error).count();
            frame.error_count += now.saturating_sub(prior).max(1) as u32;
        }
        frame.tool_results = results;
        frame
    }

    /// The successor frame at `depth + 1`. The conversation is replaced
    /// with `new_messages`; per-iteration response/result fields reset;
    /// ceilings, rolling windows, and the error count carry forward.
    pub fn next_frame(&self, new_messages: Vec<Message>) -> Self {
        Self {
            frame_id: FrameId::generate(),
            parent_frame_id: Some(self.frame_id.clone()),
            depth: self.depth + 1,
            phase: Phase::Initial,
            messages: new_messages,
            context_snapshot: None,
            context_metadata: None,
            llm_response: None,
            llm_tool_calls: vec![],
            tool_results: vec![],
            max_iterations: self.max_iterations,
            tool_call_history: self.tool_call_history.clone(),
            error_count: self.error_count,
            last_outputs: self.last_outputs.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize into a self-describing, versioned checkpoint.
    pub fn to_checkpoint(&self) -> Result<Vec<u8>, FrameError> {
        let envelope = CheckpointEnvelope {
            version: CHECKPOINT_VERSION,
            frame: self.clone(),
        };
        serde_json::to_vec(&envelope).map_err(|e| FrameError::Serialization(e.to_string()))
    }

    /// Restore a frame from checkpoint bytes.
    pub fn from_checkpoint(bytes: &[u8]) -> Result<Self, FrameError> {
        let envelope: CheckpointEnvelope =
            serde_json::from_slice(bytes).map_err(|e| FrameError::Serialization(e.to_string()))?;
        if envelope.version != CHECKPOINT_VERSION {
            return Err(FrameError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ToolCallId;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: ToolCallId::generate(),
            name: name.into(),
            arguments: json!({}),
        }
    }

    #[test]
    fn initial_frame_shape() {
        let frame = ExecutionFrame::initial("say hi", 10);
        assert_eq!(frame.depth, 0);
        assert!(frame.parent_frame_id.is_none());
        assert_eq!(frame.phase, Phase::Initial);
        assert_eq!(frame.messages.len(), 1);
        assert_eq!(frame.messages[0].content, "say hi");
    }

    #[test]
    fn with_operations_do_not_mutate() {
        let frame = ExecutionFrame::initial("task", 10);
        let evolved = frame.with_llm_response("answer".into(), vec![call("search")]);
        assert!(frame.llm_response.is_none());
        assert!(frame.tool_call_history.is_empty());
        assert_eq!(evolved.llm_response.as_deref(), Some("answer"));
        assert_eq!(evolved.tool_call_history, vec!["search"]);
    }

    #[test]
    fn next_frame_links_parent_and_increments_depth() {
        let root = ExecutionFrame::initial("task", 10);
        let next = root.next_frame(vec![Message::user("more")]);
        assert_eq!(next.parent_frame_id.as_ref(), Some(&root.frame_id));
        assert_eq!(next.depth, root.depth + 1);
        assert_eq!(next.phase, Phase::Initial);
        assert!(next.llm_response.is_none());
        assert!(next.tool_results.is_empty());
    }

    #[test]
    fn rolling_windows_are_bounded() {
        let mut frame = ExecutionFrame::initial("task", 100);
        for i in 0..ROLLING_WINDOW + 5 {
            frame = frame.with_llm_response(format!("output {i}"), vec![call("search")]);
        }
        assert_eq!(frame.last_outputs.len(), ROLLING_WINDOW);
        assert_eq!(frame.tool_call_history.len(), ROLLING_WINDOW);
        assert_eq!(
            frame.last_outputs.last().unwrap(),
            &format!("output {}", ROLLING_WINDOW + 4)
        );
    }

    #[test]
    fn error_count_accumulates_across_frames() {
        let frame = ExecutionFrame::initial("task", 10);
        let failed = ToolResult::error(
            ToolCallId::generate(),
            "boom",
            crate::error::ErrorKind::ToolExecution,
            5,
        );
        let with_errors = frame.with_tool_results(vec![failed], true);
        assert_eq!(with_errors.error_count, 1);
        let next = with_errors.next_frame(vec![]);
        assert_eq!(next.error_count, 1);
    }

    #[test]
    fn checkpoint_roundtrip_is_identity() {
        let frame = ExecutionFrame::initial("task", 10)
            .with_llm_response("thinking".into(), vec![call("read_file")])
            .with_tool_results(
                vec![ToolResult::ok(ToolCallId::new("tc_1"), "data", 3)],
                false,
            );
        let bytes = frame.to_checkpoint().unwrap();
        let restored = ExecutionFrame::from_checkpoint(&bytes).unwrap();
        assert_eq!(restored, frame);
    }

    #[test]
    fn checkpoint_rejects_future_versions() {
        let frame = ExecutionFrame::initial("task", 10);
        let mut value: serde_json::Value =
            serde_json::from_slice(&frame.to_checkpoint().unwrap()).unwrap();
        value["version"] = json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            ExecutionFrame::from_checkpoint(&bytes),
            Err(FrameError::UnsupportedVersion(99))
        ));
    }
}
