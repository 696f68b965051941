//! The recursive control loop.
//!
//! Semantically this is tail recursion: each iteration consumes a frame
//! and produces its successor. Rust's async has no tail-call elimination,
//! so the loop is flat and depth is a counter; the ordering guarantees
//! are identical.

use crate::guidance::{TaskHandler, analyze, guidance_for};
use crate::monitor::{MonitorVerdict, RecursionMonitor};
use async_trait::async_trait;
use axon_hooks::HookManager;
use axon_journal::Journal;
use axon_memory::{ContextAssembler, LayeredMemory};
use axon_tool::{BatchOutcome, ToolOrchestrator, ToolRegistry};
use axon_types::{
    ChatRequest, ContextComponent, EngineConfig, EntrySource, ErrorKind, Event, EventKind,
    EventSink, ExecutionFrame, JournalError, LlmProvider, Message, Phase, ProviderError, Role,
    StreamItem, ThreadId, ToolCall, ToolCallId, ToolResult, priority,
};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Journals each event, then forwards it to the caller's stream.
pub(crate) struct Bus {
    thread_id: ThreadId,
    journal: Arc<Journal>,
    tx: mpsc::Sender<Event>,
    journal_failure: StdMutex<Option<JournalError>>,
}

impl Bus {
    pub(crate) fn new(thread_id: ThreadId, journal: Arc<Journal>, tx: mpsc::Sender<Event>) -> Self {
        Self {
            thread_id,
            journal,
            tx,
            journal_failure: StdMutex::new(None),
        }
    }

    fn take_journal_failure(&self) -> Option<JournalError> {
        self.journal_failure.lock().unwrap().take()
    }
}

#[async_trait]
impl EventSink for Bus {
    async fn emit(&self, event: Event) {
        if let Err(e) = self.journal.append(&event).await {
            tracing::error!(thread_id = %self.thread_id, error = %e, "journal append failed");
            *self.journal_failure.lock().unwrap() = Some(e);
        }
        // A dropped receiver is not an error: the run keeps journaling.
        let _ = self.tx.send(event).await;
    }
}

/// Where a (possibly resumed) run re-enters the loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub(crate) enum LoopEntry {
    /// Full iteration: recursion control, context assembly, model call.
    Full = 0,
    /// The model turn exists; decide whether tools are needed.
    Decision = 3,
    /// Tool calls exist with results missing; run the remainder.
    ToolExecution = 4,
    /// Tools are done; build the successor conversation.
    Recursion = 5,
}

/// Pick the re-entry point a reconstructed frame calls for.
pub(crate) fn entry_for(frame: &ExecutionFrame) -> LoopEntry {
    if frame.llm_response.is_none() {
        return LoopEntry::Full;
    }
    if frame.llm_tool_calls.is_empty() {
        return LoopEntry::Decision;
    }
    let done: HashSet<&ToolCallId> = frame.tool_results.iter().map(|r| &r.tool_call_id).collect();
    if frame.llm_tool_calls.iter().all(|c| done.contains(&c.id)) {
        LoopEntry::Recursion
    } else {
        LoopEntry::ToolExecution
    }
}

/// Everything the loop needs, injected at construction. No globals.
pub(crate) struct EngineCore {
    pub provider: Arc<dyn LlmProvider>,
    pub registry: Arc<ToolRegistry>,
    pub hooks: Arc<HookManager>,
    pub memory: Arc<tokio::sync::Mutex<LayeredMemory>>,
    pub journal: Arc<Journal>,
    pub handlers: Vec<Arc<dyn TaskHandler>>,
    pub config: EngineConfig,
    pub system_prompt: String,
}

impl EngineCore {
    /// Drive a run to its terminal event, streaming through `bus`.
    pub(crate) async fn run_loop(
        self: Arc<Self>,
        thread_id: ThreadId,
        mut frame: ExecutionFrame,
        bus: Arc<Bus>,
        cancel: CancellationToken,
        mut entry: LoopEntry,
    ) {
        let monitor = RecursionMonitor::new(&self.config);
        let orchestrator = ToolOrchestrator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.hooks),
            self.config.max_parallel_read_tools,
            Duration::from_millis(self.config.tool_timeout_ms.max(1)),
        );
        let original_task = frame
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.hooks.reset_bypassed();

        'run: loop {
            if entry == LoopEntry::Full {
                // ── Phase 0: recursion control ──
                if cancel.is_cancelled() {
                    self.emit(&bus, &thread_id, &frame, EventKind::ExecutionCancelled, "")
                        .await;
                    break 'run;
                }
                frame = self.hooks.before_iteration_start(frame).await;
                bus.emit(iteration_start_event(&thread_id, &frame)).await;
                if self.journal_broken(&bus, &thread_id, &frame).await {
                    break 'run;
                }

                match monitor.check(&frame) {
                    MonitorVerdict::Terminate { reason, kind } => {
                        bus.emit(
                            Event::new(
                                thread_id.clone(),
                                kind,
                                frame.frame_id.clone(),
                                frame.depth,
                            )
                            .with_content(reason.clone())
                            .with_metadata(json!({"reason": reason})),
                        )
                        .await;
                        break 'run;
                    }
                    MonitorVerdict::Warn(note) => {
                        frame = append_system_note(&frame, note);
                    }
                    MonitorVerdict::Continue => {}
                }

                // ── Phase 1: context assembly ──
                frame = self.hooks.before_context_assembly(frame).await;
                self.emit(&bus, &thread_id, &frame, EventKind::ContextAssemblyStart, "")
                    .await;
                let components = self.build_components(&thread_id, &frame, &bus).await;
                let assembled = ContextAssembler::assemble(
                    &components,
                    self.config.max_context_tokens,
                    self.config.token_buffer_ratio,
                );
                let (snapshot, metadata) = match assembled {
                    Ok(pair) => pair,
                    Err(e) => {
                        self.fatal(
                            &bus,
                            &thread_id,
                            &frame,
                            ErrorKind::ContextOverflow,
                            &e.to_string(),
                        )
                        .await;
                        break 'run;
                    }
                };
                let (snapshot, metadata) = self
                    .hooks
                    .after_context_assembly(&frame, snapshot, metadata)
                    .await;
                bus.emit(
                    Event::new(
                        thread_id.clone(),
                        EventKind::ContextAssemblyComplete,
                        frame.frame_id.clone(),
                        frame.depth,
                    )
                    .with_metadata(json!({"context": &metadata})),
                )
                .await;
                frame = frame.with_context(snapshot, metadata);

                // ── Phase 2: model call ──
                if cancel.is_cancelled() {
                    self.emit(&bus, &thread_id, &frame, EventKind::ExecutionCancelled, "")
                        .await;
                    break 'run;
                }
                let mut outgoing = Vec::new();
                if let Some(snapshot) = &frame.context_snapshot {
                    if !snapshot.is_empty() {
                        outgoing.push(Message::system(snapshot.clone()));
                    }
                }
                outgoing.extend(frame.messages.iter().cloned());
                let outgoing = self.hooks.before_llm_call(&frame, outgoing).await;

                self.emit(&bus, &thread_id, &frame, EventKind::LlmStart, "")
                    .await;
                let (text, calls) = match self.call_llm(&thread_id, &frame, outgoing, &bus).await {
                    Ok(pair) => pair,
                    Err((kind, message)) => {
                        self.fatal(&bus, &thread_id, &frame, kind, &message).await;
                        break 'run;
                    }
                };
                self.emit(&bus, &thread_id, &frame, EventKind::LlmComplete, &text)
                    .await;
                if !calls.is_empty() {
                    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                    bus.emit(
                        Event::new(
                            thread_id.clone(),
                            EventKind::LlmToolCalls,
                            frame.frame_id.clone(),
                            frame.depth,
                        )
                        .with_content(names.join(", "))
                        .with_metadata(json!({"calls": &calls})),
                    )
                    .await;
                }
                let (text, calls) = self.hooks.after_llm_response(&frame, text, calls).await;
                frame = frame.with_llm_response(text, calls);
                if let Some(response) = &frame.llm_response {
                    if !response.is_empty() {
                        self.memory.lock().await.record(
                            EntrySource::AssistantOutput,
                            response.clone(),
                            None,
                            false,
                        );
                    }
                }
            }

            if entry <= LoopEntry::Decision {
                // ── Phase 3: decision ──
                if frame.llm_tool_calls.is_empty() {
                    let text = frame.llm_response.clone().unwrap_or_default();
                    self.emit(&bus, &thread_id, &frame, EventKind::AgentFinish, &text)
                        .await;
                    frame = frame.with_phase(Phase::Completed);
                    let _ = self.hooks.after_iteration_end(frame).await;
                    break 'run;
                }
            }

            if entry <= LoopEntry::ToolExecution {
                // ── Phase 4: tool execution ──
                let done: HashSet<&ToolCallId> =
                    frame.tool_results.iter().map(|r| &r.tool_call_id).collect();
                let pending: Vec<ToolCall> = frame
                    .llm_tool_calls
                    .iter()
                    .filter(|c| !done.contains(&c.id))
                    .cloned()
                    .collect();
                drop(done);

                if !pending.is_empty() {
                    let sink: Arc<dyn EventSink> = bus.clone();
                    let outcome = orchestrator
                        .execute_batch(&thread_id, &frame, &pending, sink, &cancel)
                        .await;
                    match outcome {
                        BatchOutcome::Completed { results, .. } => {
                            {
                                let mut memory = self.memory.lock().await;
                                for result in &results {
                                    let tool = frame
                                        .llm_tool_calls
                                        .iter()
                                        .find(|c| c.id == result.tool_call_id)
                                        .map(|c| c.name.as_str());
                                    let source = if result.is_error {
                                        EntrySource::Error
                                    } else {
                                        EntrySource::ToolResult
                                    };
                                    memory.record(
                                        source,
                                        result.content.clone(),
                                        tool,
                                        result.is_error,
                                    );
                                }
                                match memory.promote_async().await {
                                    Ok(report) => {
                                        for record in &report.compressions {
                                            bus.emit(
                                                Event::new(
                                                    thread_id.clone(),
                                                    EventKind::CompressionApplied,
                                                    frame.frame_id.clone(),
                                                    frame.depth,
                                                )
                                                .with_metadata(json!({
                                                    "inputs": &record.inputs,
                                                    "target_tokens": record.target_tokens,
                                                    "summaries": record.summaries.len(),
                                                })),
                                            )
                                            .await;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "memory promotion failed");
                                    }
                                }
                            }

                            let prior_errors =
                                frame.tool_results.iter().filter(|r| r.is_error).count();
                            let merged = merge_results(&frame, results);
                            let had_error =
                                merged.iter().filter(|r| r.is_error).count() > prior_errors;
                            frame = frame.with_tool_results(merged, had_error);
                        }
                        BatchOutcome::Interrupted {
                            reason,
                            requires_user_input,
                            completed,
                        } => {
                            let merged = merge_results(&frame, completed);
                            let had_error = merged.iter().any(|r| r.is_error);
                            let paused = frame.with_tool_results(merged, had_error);
                            let checkpoint = paused
                                .to_checkpoint()
                                .ok()
                                .and_then(|b| serde_json::from_slice::<serde_json::Value>(&b).ok());
                            bus.emit(
                                Event::new(
                                    thread_id.clone(),
                                    EventKind::ExecutionInterrupted,
                                    paused.frame_id.clone(),
                                    paused.depth,
                                )
                                .with_content(reason.clone())
                                .with_metadata(json!({
                                    "checkpoint": checkpoint,
                                    "requires_user_input": requires_user_input,
                                    "reason": reason,
                                })),
                            )
                            .await;
                            break 'run;
                        }
                        BatchOutcome::Cancelled { .. } => {
                            self.emit(&bus, &thread_id, &frame, EventKind::ExecutionCancelled, "")
                                .await;
                            break 'run;
                        }
                    }
                }
                if self.journal_broken(&bus, &thread_id, &frame).await {
                    break 'run;
                }
            }

            // ── Phase 5: tail recursion ──
            let analysis = analyze(&frame.tool_results);
            let mut next_messages = frame.messages.clone();
            next_messages.push(Message::assistant(
                frame.llm_response.clone().unwrap_or_default(),
                frame.llm_tool_calls.clone(),
            ));
            for call in &frame.llm_tool_calls {
                if let Some(result) = frame
                    .tool_results
                    .iter()
                    .find(|r| r.tool_call_id == call.id)
                {
                    next_messages.push(Message::tool(
                        result.tool_call_id.clone(),
                        result.content.clone(),
                    ));
                }
            }
            // Guidance goes after the tool messages; providers reject any
            // other ordering.
            if let Some(guidance) =
                guidance_for(&self.handlers, &original_task, &analysis, frame.depth)
            {
                next_messages.push(Message::system(guidance));
            }
            if frame.depth > 3 {
                next_messages.push(Message::system(format!(
                    "Progress check: {} iterations used out of {}. Focus on completing the task.",
                    frame.depth + 1,
                    frame.max_iterations
                )));
            }

            let next = frame.next_frame(next_messages);
            let next = self.hooks.before_recursion(&frame, next).await;
            bus.emit(
                Event::new(
                    thread_id.clone(),
                    EventKind::Recursion,
                    frame.frame_id.clone(),
                    frame.depth,
                )
                .with_metadata(json!({"messages": &next.messages})),
            )
            .await;
            self.emit(&bus, &thread_id, &frame, EventKind::IterationEnd, "")
                .await;
            let _ = self
                .hooks
                .after_iteration_end(frame.with_phase(Phase::Recursion))
                .await;
            frame = next;
            entry = LoopEntry::Full;
        }

        if let Err(e) = self.journal.flush(&thread_id).await {
            tracing::error!(thread_id = %thread_id, error = %e, "final journal flush failed");
        }
    }

    /// Assemble the context components for this iteration.
    async fn build_components(
        &self,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        bus: &Arc<Bus>,
    ) -> Vec<ContextComponent> {
        let mut components = Vec::new();
        if !self.system_prompt.is_empty() {
            components.push(ContextComponent::new(
                "system_instructions",
                &self.system_prompt,
                priority::CRITICAL,
            ));
        }

        let memory = self.memory.lock().await;
        if memory.has_recallable() {
            let query = frame
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            if !query.is_empty() {
                self.emit(bus, thread_id, frame, EventKind::RetrievalStart, &query)
                    .await;
                match memory.recall(&query, 5).await {
                    Ok(hits) => {
                        bus.emit(
                            Event::new(
                                thread_id.clone(),
                                EventKind::RetrievalComplete,
                                frame.frame_id.clone(),
                                frame.depth,
                            )
                            .with_metadata(json!({"hits": hits.len()})),
                        )
                        .await;
                        if !hits.is_empty() {
                            let text = hits
                                .iter()
                                .map(|e| e.content.as_str())
                                .collect::<Vec<_>>()
                                .join("\n");
                            components.push(ContextComponent::new(
                                "recalled_memory",
                                text,
                                priority::LOW,
                            ));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "memory recall failed");
                        bus.emit(
                            Event::new(
                                thread_id.clone(),
                                EventKind::RetrievalComplete,
                                frame.frame_id.clone(),
                                frame.depth,
                            )
                            .with_metadata(json!({"hits": 0, "error": e.to_string()})),
                        )
                        .await;
                    }
                }
            }
        }

        let summaries = memory.summaries();
        if !summaries.is_empty() {
            let text = summaries
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            components.push(ContextComponent::new(
                "memory_summaries",
                text,
                priority::MEDIUM,
            ));
        }
        components
    }

    /// Call the model with retry and the per-iteration deadline.
    async fn call_llm(
        &self,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        messages: Vec<Message>,
        bus: &Arc<Bus>,
    ) -> Result<(String, Vec<ToolCall>), (ErrorKind, String)> {
        let request = ChatRequest {
            messages,
            tools: self.registry.schemas(),
            temperature: None,
            max_tokens: None,
        };
        let deadline = Duration::from_millis(self.config.llm_timeout_ms.max(1));
        let mut backoff = Duration::from_secs(1);
        let mut last: (ErrorKind, String) = (ErrorKind::LlmTransport, String::new());
        let mut recovering = false;

        for attempt in 1..=3u32 {
            if attempt > 1 {
                recovering = true;
                bus.emit(
                    Event::new(
                        thread_id.clone(),
                        EventKind::RecoveryAttempt,
                        frame.frame_id.clone(),
                        frame.depth,
                    )
                    .with_content(last.1.clone())
                    .with_metadata(json!({"attempt": attempt, "kind": last.0})),
                )
                .await;
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match tokio::time::timeout(
                deadline,
                self.stream_once(thread_id, frame, request.clone(), bus),
            )
            .await
            {
                Ok(Ok(pair)) => {
                    if recovering {
                        self.emit(bus, thread_id, frame, EventKind::RecoverySuccess, "")
                            .await;
                    }
                    return Ok(pair);
                }
                Ok(Err(e)) => {
                    let retryable = e.is_retryable();
                    last = (ErrorKind::LlmTransport, e.to_string());
                    if !retryable {
                        break;
                    }
                }
                Err(_) => {
                    last = (
                        ErrorKind::LlmTimeout,
                        format!("model call exceeded {}ms", deadline.as_millis()),
                    );
                }
            }
        }

        if recovering {
            self.emit(bus, thread_id, frame, EventKind::RecoveryFailed, &last.1)
                .await;
        }
        Err(last)
    }

    /// One streamed model call: deltas out, text and calls collected.
    async fn stream_once(
        &self,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        request: ChatRequest,
        bus: &Arc<Bus>,
    ) -> Result<(String, Vec<ToolCall>), ProviderError> {
        let mut stream = self.provider.stream_chat(request).await?;
        let mut text = String::new();
        let mut calls = Vec::new();
        while let Some(item) = stream.next().await {
            match item? {
                StreamItem::TextDelta(delta) => {
                    self.emit(bus, thread_id, frame, EventKind::LlmDelta, &delta)
                        .await;
                    text.push_str(&delta);
                }
                StreamItem::ToolCall(call) => calls.push(call),
                StreamItem::Done => break,
            }
        }
        Ok((text, calls))
    }

    async fn emit(
        &self,
        bus: &Arc<Bus>,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        kind: EventKind,
        content: &str,
    ) {
        bus.emit(
            Event::new(thread_id.clone(), kind, frame.frame_id.clone(), frame.depth)
                .with_content(content),
        )
        .await;
    }

    /// Emit the single terminal `error` event for a fatal failure.
    async fn fatal(
        &self,
        bus: &Arc<Bus>,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        kind: ErrorKind,
        message: &str,
    ) {
        bus.emit(
            Event::new(
                thread_id.clone(),
                EventKind::Error,
                frame.frame_id.clone(),
                frame.depth,
            )
            .with_content(message)
            .with_metadata(json!({
                "kind": kind,
                "message": message,
                "recoverable": kind.is_recoverable(),
            })),
        )
        .await;
    }

    /// Journal failures are fatal: emit the terminal error if one landed.
    async fn journal_broken(
        &self,
        bus: &Arc<Bus>,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
    ) -> bool {
        if let Some(e) = bus.take_journal_failure() {
            self.fatal(bus, thread_id, frame, ErrorKind::JournalWrite, &e.to_string())
                .await;
            return true;
        }
        false
    }
}

/// The `iteration_start` event carries enough of the frame to rebuild the
/// run from the journal alone.
fn iteration_start_event(thread_id: &ThreadId, frame: &ExecutionFrame) -> Event {
    Event::new(
        thread_id.clone(),
        EventKind::IterationStart,
        frame.frame_id.clone(),
        frame.depth,
    )
    .with_metadata(json!({
        "messages": &frame.messages,
        "max_iterations": frame.max_iterations,
        "error_count": frame.error_count,
        "tool_call_history": &frame.tool_call_history,
        "last_outputs": &frame.last_outputs,
        "parent_frame_id": frame.parent_frame_id.as_ref().map(|id| id.as_str()),
    }))
}

fn append_system_note(frame: &ExecutionFrame, note: String) -> ExecutionFrame {
    let mut messages = frame.messages.clone();
    messages.push(Message::system(note));
    ExecutionFrame {
        messages,
        ..frame.clone()
    }
}

/// Combine existing (resumed) results with a fresh batch, ordered by the
/// requesting calls.
fn merge_results(frame: &ExecutionFrame, new: Vec<ToolResult>) -> Vec<ToolResult> {
    let mut pool: Vec<ToolResult> = frame.tool_results.clone();
    pool.extend(new);
    let mut ordered = Vec::with_capacity(pool.len());
    for call in &frame.llm_tool_calls {
        if let Some(pos) = pool.iter().position(|r| r.tool_call_id == call.id) {
            ordered.push(pool.swap_remove(pos));
        }
    }
    ordered.extend(pool);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_for_fresh_frame_is_full() {
        let frame = ExecutionFrame::initial("task", 5);
        assert_eq!(entry_for(&frame), LoopEntry::Full);
    }

    #[test]
    fn entry_for_text_only_turn_is_decision() {
        let frame = ExecutionFrame::initial("task", 5).with_llm_response("done".into(), vec![]);
        assert_eq!(entry_for(&frame), LoopEntry::Decision);
    }

    #[test]
    fn entry_for_pending_tools_is_tool_execution() {
        let call = ToolCall {
            id: ToolCallId::new("tc_1"),
            name: "read_file".into(),
            arguments: json!({}),
        };
        let frame = ExecutionFrame::initial("task", 5).with_llm_response("reading".into(), vec![call]);
        assert_eq!(entry_for(&frame), LoopEntry::ToolExecution);
    }

    #[test]
    fn entry_for_finished_tools_is_recursion() {
        let call = ToolCall {
            id: ToolCallId::new("tc_1"),
            name: "read_file".into(),
            arguments: json!({}),
        };
        let frame = ExecutionFrame::initial("task", 5)
            .with_llm_response("reading".into(), vec![call])
            .with_tool_results(vec![ToolResult::ok(ToolCallId::new("tc_1"), "data", 1)], false);
        assert_eq!(entry_for(&frame), LoopEntry::Recursion);
    }

    #[test]
    fn merge_results_orders_by_call_order() {
        let call_a = ToolCall {
            id: ToolCallId::new("tc_a"),
            name: "a".into(),
            arguments: json!({}),
        };
        let call_b = ToolCall {
            id: ToolCallId::new("tc_b"),
            name: "b".into(),
            arguments: json!({}),
        };
        let frame = ExecutionFrame::initial("task", 5)
            .with_llm_response("".into(), vec![call_a, call_b])
            .with_tool_results(vec![ToolResult::ok(ToolCallId::new("tc_b"), "b out", 1)], false);

        let merged = merge_results(&frame, vec![ToolResult::ok(ToolCallId::new("tc_a"), "a out", 1)]);
        assert_eq!(merged[0].tool_call_id.as_str(), "tc_a");
        assert_eq!(merged[1].tool_call_id.as_str(), "tc_b");
    }
}
