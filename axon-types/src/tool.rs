//! Tool calls, results, and the tool capability trait.

use crate::error::{ErrorKind, ToolError};
use crate::id::ToolCallId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A structured tool-call request produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, assigned by the model.
    pub id: ToolCallId,
    /// Name of the tool to invoke.
    pub name: String,
    /// Tool input arguments.
    pub arguments: serde_json::Value,
}

/// The result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call this result answers.
    pub tool_call_id: ToolCallId,
    /// Textual result content.
    pub content: String,
    /// Whether the execution failed.
    pub is_error: bool,
    /// Failure classification, present when `is_error` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Wall time of the execution in milliseconds.
    pub execution_time_ms: u64,
}

impl ToolResult {
    /// Build a successful result.
    pub fn ok(tool_call_id: ToolCallId, content: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: false,
            error_kind: None,
            execution_time_ms: elapsed_ms,
        }
    }

    /// Build an error result with the given classification.
    pub fn error(
        tool_call_id: ToolCallId,
        content: impl Into<String>,
        kind: ErrorKind,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            tool_call_id,
            content: content.into(),
            is_error: true,
            error_kind: Some(kind),
            execution_time_ms: elapsed_ms,
        }
    }

    /// Build the synthetic non-error result for a call a hook skipped.
    pub fn skipped(tool_call_id: ToolCallId, reason: &str) -> Self {
        Self {
            tool_call_id,
            content: format!("skipped: {reason}"),
            is_error: false,
            error_kind: None,
            execution_time_ms: 0,
        }
    }
}

/// The tool capability trait — anything the model may invoke.
///
/// Tools declare their side-effect class via [`is_read_only`](Tool::is_read_only):
/// read-only tools may run concurrently with each other, everything else is
/// serialized. Both flags default to the fail-safe choice, so a tool that
/// says nothing is treated as side-effecting and unconfirmed.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Whether the tool has no observable side effects.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether a human must confirm before this tool runs.
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError>;
}
