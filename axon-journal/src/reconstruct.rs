//! Folding journaled events back into execution frames.
//!
//! The journal is the authoritative history: every field a resumed run
//! needs is carried on some event's metadata. `iteration_start` carries
//! the conversation and counters, `llm_complete`/`llm_tool_calls` carry
//! the model turn, `tool_result`/`tool_error` carry results, `recursion`
//! carries the successor conversation, and `execution_interrupted` embeds
//! a full frame checkpoint.

use axon_types::{
    Compressor, Event, EventKind, ExecutionFrame, FrameId, JournalError, MemoryEntry, Message,
    Phase, ToolCall, ToolResult,
};

/// What a replay pass learned beyond the frame itself.
#[derive(Debug, Clone, Default)]
pub struct ReplayMetadata {
    /// Events applied to the reconstruction.
    pub events_applied: usize,
    /// Recursion boundaries crossed.
    pub iterations: u32,
    /// The terminal event kind, when the log reached one.
    pub terminal: Option<EventKind>,
    /// Whether the run was paused by a hook.
    pub interrupted: bool,
}

/// Rebuilds frames from event logs.
pub struct Reconstructor;

struct Fold {
    frame: Option<ExecutionFrame>,
    pending_text: Option<String>,
    pending_calls: Vec<ToolCall>,
    pending_results: Vec<ToolResult>,
    meta: ReplayMetadata,
}

impl Fold {
    fn new() -> Self {
        Self {
            frame: None,
            pending_text: None,
            pending_calls: Vec::new(),
            pending_results: Vec::new(),
            meta: ReplayMetadata::default(),
        }
    }

    /// Apply a buffered model turn, if one is pending.
    fn flush_llm(&mut self) {
        if self.pending_text.is_none() && self.pending_calls.is_empty() {
            return;
        }
        if let Some(frame) = self.frame.take() {
            let text = self.pending_text.take().unwrap_or_default();
            let calls = std::mem::take(&mut self.pending_calls);
            self.frame = Some(frame.with_llm_response(text, calls));
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(frame) = self.frame.take() {
            self.frame = Some(frame.with_phase(phase));
        }
    }

    fn apply(&mut self, event: &Event) {
        match event.kind {
            EventKind::IterationStart => {
                let meta = &event.metadata;
                let messages: Option<Vec<Message>> = meta
                    .get("messages")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                match self.frame.take() {
                    Some(existing) => {
                        // Sync identity and conversation with the live run's
                        // successor frame.
                        let mut frame = existing;
                        frame.frame_id = event.frame_id.clone();
                        frame.depth = event.depth;
                        frame.phase = Phase::Initial;
                        if let Some(messages) = messages {
                            frame.messages = messages;
                        }
                        self.frame = Some(frame);
                    }
                    None => {
                        let mut frame = ExecutionFrame::from_messages(
                            messages.unwrap_or_default(),
                            meta.get("max_iterations")
                                .and_then(|v| v.as_u64())
                                .unwrap_or(0) as u32,
                        );
                        frame.frame_id = event.frame_id.clone();
                        frame.depth = event.depth;
                        frame.parent_frame_id = meta
                            .get("parent_frame_id")
                            .and_then(|v| v.as_str())
                            .map(FrameId::new);
                        frame.error_count = meta
                            .get("error_count")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0) as u32;
                        if let Some(history) = meta
                            .get("tool_call_history")
                            .and_then(|v| serde_json::from_value(v.clone()).ok())
                        {
                            frame.tool_call_history = history;
                        }
                        if let Some(outputs) = meta
                            .get("last_outputs")
                            .and_then(|v| serde_json::from_value(v.clone()).ok())
                        {
                            frame.last_outputs = outputs;
                        }
                        self.frame = Some(frame);
                    }
                }
            }
            EventKind::PhaseStart => {
                if let Some(phase) = event
                    .metadata
                    .get("phase")
                    .and_then(|v| serde_json::from_value::<Phase>(v.clone()).ok())
                {
                    self.set_phase(phase);
                }
            }
            EventKind::ContextAssemblyComplete => {
                if let Some(frame) = self.frame.take() {
                    let mut frame = frame.with_phase(Phase::ContextAssembly);
                    frame.context_metadata = event
                        .metadata
                        .get("context")
                        .and_then(|v| serde_json::from_value(v.clone()).ok());
                    self.frame = Some(frame);
                }
            }
            EventKind::LlmComplete => {
                self.pending_text = Some(event.content.clone());
            }
            EventKind::LlmToolCalls => {
                if let Some(calls) = event
                    .metadata
                    .get("calls")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    self.pending_calls = calls;
                }
            }
            EventKind::ToolCallsStart => {
                self.flush_llm();
                self.set_phase(Phase::ToolExecution);
            }
            EventKind::ToolResult | EventKind::ToolError => {
                if let Some(result) = event
                    .metadata
                    .get("result")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    self.pending_results.push(result);
                }
            }
            EventKind::ToolCallsComplete => {
                if let Some(frame) = self.frame.take() {
                    let results = std::mem::take(&mut self.pending_results);
                    let had_error = results.iter().any(|r: &ToolResult| r.is_error);
                    self.frame = Some(frame.with_tool_results(results, had_error));
                }
            }
            EventKind::Recursion => {
                self.flush_llm();
                if let Some(frame) = self.frame.take() {
                    let messages: Vec<Message> = event
                        .metadata
                        .get("messages")
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_default();
                    self.frame = Some(frame.with_phase(Phase::Recursion).next_frame(messages));
                    self.meta.iterations += 1;
                }
            }
            EventKind::AgentFinish => {
                self.flush_llm();
                self.set_phase(Phase::Completed);
                self.meta.terminal = Some(event.kind);
            }
            EventKind::RecursionTerminated | EventKind::MaxIterationsReached => {
                self.flush_llm();
                self.meta.terminal = Some(event.kind);
            }
            EventKind::ExecutionInterrupted => {
                self.flush_llm();
                self.meta.interrupted = true;
                self.meta.terminal = Some(event.kind);
                // The interrupt path checkpoints the live frame; prefer it.
                if let Some(checkpoint) = event.metadata.get("checkpoint") {
                    if let Ok(bytes) = serde_json::to_vec(checkpoint) {
                        if let Ok(frame) = ExecutionFrame::from_checkpoint(&bytes) {
                            self.frame = Some(frame);
                        }
                    }
                }
            }
            EventKind::ExecutionCancelled => {
                self.flush_llm();
                self.meta.terminal = Some(event.kind);
            }
            EventKind::Error => {
                self.flush_llm();
                self.set_phase(Phase::Error);
                self.meta.terminal = Some(event.kind);
            }
            _ => {}
        }
        self.meta.events_applied += 1;
    }

    fn finish(mut self) -> Result<(ExecutionFrame, ReplayMetadata), JournalError> {
        self.flush_llm();
        match self.frame {
            Some(frame) => Ok((frame, self.meta)),
            None => Err(JournalError::ReplayFailed(
                "no iteration_start event in log".into(),
            )),
        }
    }
}

impl Reconstructor {
    /// Fold a full event log into the frame it describes.
    pub fn reconstruct(events: &[Event]) -> Result<(ExecutionFrame, ReplayMetadata), JournalError> {
        let mut fold = Fold::new();
        for event in events {
            fold.apply(event);
        }
        fold.finish()
    }

    /// Fold until the n-th recursion boundary: `n = 0` yields the root
    /// iteration's final state, `n = 1` the state one recursion in, etc.
    pub fn reconstruct_at_iteration(
        events: &[Event],
        n: u32,
    ) -> Result<(ExecutionFrame, ReplayMetadata), JournalError> {
        let mut fold = Fold::new();
        for event in events {
            if event.kind == EventKind::Recursion && fold.meta.iterations >= n {
                break;
            }
            fold.apply(event);
        }
        fold.finish()
    }

    /// Fold the log and re-run every journaled compression step with a
    /// different compressor, returning the re-derived summaries alongside
    /// the frame. `compression_applied` events journal their inputs and
    /// token target precisely so the strategy can be upgraded after the
    /// fact.
    pub async fn reconstruct_with_compressor(
        events: &[Event],
        compressor: &dyn Compressor,
    ) -> Result<(ExecutionFrame, ReplayMetadata, Vec<MemoryEntry>), JournalError> {
        let mut summaries = Vec::new();
        for event in events {
            if event.kind != EventKind::CompressionApplied {
                continue;
            }
            let inputs: Vec<MemoryEntry> = event
                .metadata
                .get("inputs")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            if inputs.is_empty() {
                continue;
            }
            let target = event
                .metadata
                .get("target_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            let batch = compressor
                .compress(&inputs, target)
                .await
                .map_err(|e| JournalError::ReplayFailed(e.to_string()))?;
            summaries.extend(batch);
        }
        let (frame, meta) = Self::reconstruct(events)?;
        Ok((frame, meta, summaries))
    }
}
