//! The lifecycle hook interface — observation and intervention at nine
//! well-defined points of the execution loop.

use crate::context::ContextMetadata;
use crate::error::HookError;
use crate::frame::ExecutionFrame;
use crate::message::Message;
use crate::tool::{ToolCall, ToolResult};
use async_trait::async_trait;

/// What a hook decides about a tool call at the pre-execution gate.
///
/// This is the non-exceptional encoding of the human-in-the-loop contract:
/// a hook either lets the call proceed (optionally replacing it), skips it
/// (a synthetic non-error result is backfilled), or interrupts the whole
/// run so a human can weigh in. The current frame is checkpointed before
/// the interrupt surfaces, so the thread can be resumed later.
#[derive(Debug, Clone)]
pub enum ToolGate {
    /// Proceed, optionally with a replacement call.
    Proceed(Option<ToolCall>),
    /// Do not execute; backfill a `skipped: <reason>` result and continue.
    Skip {
        /// Why the call was skipped.
        reason: String,
    },
    /// Pause the run before the call executes.
    Interrupt {
        /// Why execution paused.
        reason: String,
        /// Whether resumption needs fresh user input.
        requires_user_input: bool,
    },
}

/// A hook that observes and intervenes in the execution loop.
///
/// All nine callbacks are optional — the default bodies are the
/// "not implemented" sentinel (no change). At each point, registered
/// hooks run in registration order and each sees the output of the
/// previous one; returning `Ok(None)` (or `Proceed(None)` at the tool
/// gate) means "no change".
///
/// Returning an error does NOT halt the run — it is logged and the hook
/// is bypassed for the remainder of the run. Use [`ToolGate::Interrupt`]
/// to pause execution.
///
/// Hook handlers SHOULD complete quickly: every callback sits on the
/// engine's critical path.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Name used in logs when this hook fails or intervenes.
    fn name(&self) -> &str {
        "hook"
    }

    /// Fires when a new iteration is entered. May replace the frame.
    async fn before_iteration_start(
        &self,
        frame: &ExecutionFrame,
    ) -> Result<Option<ExecutionFrame>, HookError> {
        let _ = frame;
        Ok(None)
    }

    /// Fires before context assembly. May replace the frame.
    async fn before_context_assembly(
        &self,
        frame: &ExecutionFrame,
    ) -> Result<Option<ExecutionFrame>, HookError> {
        let _ = frame;
        Ok(None)
    }

    /// Fires after context assembly. May replace the snapshot and metadata.
    async fn after_context_assembly(
        &self,
        frame: &ExecutionFrame,
        snapshot: &str,
        metadata: &ContextMetadata,
    ) -> Result<Option<(String, ContextMetadata)>, HookError> {
        let _ = (frame, snapshot, metadata);
        Ok(None)
    }

    /// Fires before the model call. May replace the outgoing messages.
    async fn before_llm_call(
        &self,
        frame: &ExecutionFrame,
        messages: &[Message],
    ) -> Result<Option<Vec<Message>>, HookError> {
        let _ = (frame, messages);
        Ok(None)
    }

    /// Fires after the model responds. May replace the text and tool calls.
    async fn after_llm_response(
        &self,
        frame: &ExecutionFrame,
        text: &str,
        calls: &[ToolCall],
    ) -> Result<Option<(String, Vec<ToolCall>)>, HookError> {
        let _ = (frame, text, calls);
        Ok(None)
    }

    /// Fires for each tool call, inside the orchestrator, before execution.
    async fn before_tool_execution(
        &self,
        frame: &ExecutionFrame,
        call: &ToolCall,
    ) -> Result<ToolGate, HookError> {
        let _ = (frame, call);
        Ok(ToolGate::Proceed(None))
    }

    /// Fires after each tool call completes. May replace the result.
    async fn after_tool_execution(
        &self,
        frame: &ExecutionFrame,
        result: &ToolResult,
    ) -> Result<Option<ToolResult>, HookError> {
        let _ = (frame, result);
        Ok(None)
    }

    /// Fires before tail recursion. May replace the successor frame.
    async fn before_recursion(
        &self,
        frame: &ExecutionFrame,
        next_frame: &ExecutionFrame,
    ) -> Result<Option<ExecutionFrame>, HookError> {
        let _ = (frame, next_frame);
        Ok(None)
    }

    /// Fires after the iteration finishes. May replace the frame.
    async fn after_iteration_end(
        &self,
        frame: &ExecutionFrame,
    ) -> Result<Option<ExecutionFrame>, HookError> {
        let _ = frame;
        Ok(None)
    }
}
