//! Side-effect-aware batch execution of tool calls.

use axon_hooks::{GateDecision, HookManager};
use axon_types::{
    ErrorKind, Event, EventKind, EventSink, ExecutionFrame, ThreadId, Tool, ToolCall, ToolResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::registry::ToolRegistry;

/// Aggregate statistics for one executed batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    /// Calls in the batch.
    pub total: usize,
    /// Calls that produced error results.
    pub errors: usize,
    /// Wall time of the whole batch in milliseconds.
    pub duration_ms: u64,
}

/// How a batch ended.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Every call ran (or was skipped); results are in request order.
    Completed {
        /// One result per call, in request order.
        results: Vec<ToolResult>,
        /// Aggregate stats, as journaled on `tool_calls_complete`.
        stats: BatchStats,
    },
    /// A hook (or an unconfirmed side-effecting tool) paused the run
    /// before a call executed.
    Interrupted {
        /// Why execution paused.
        reason: String,
        /// Whether resumption needs fresh user input.
        requires_user_input: bool,
        /// Results completed before the pause, in request order.
        completed: Vec<ToolResult>,
    },
    /// The cancellation token tripped between calls.
    Cancelled {
        /// Results completed before cancellation, in request order.
        completed: Vec<ToolResult>,
    },
}

/// Executes tool batches with the partition-by-side-effect policy.
///
/// Read-only calls run concurrently under a semaphore; side-effecting
/// calls run sequentially, in request order, strictly after every read
/// has finished. Unregistered tools count as side-effecting. Running
/// everything in parallel races reads against writes on shared
/// resources; running everything serially wastes the latency of
/// independent reads — the partition is the simplest policy that is
/// correct on both counts.
pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    hooks: Arc<HookManager>,
    max_parallel: usize,
    tool_timeout: Duration,
}

impl ToolOrchestrator {
    /// Create an orchestrator over a registry and hook pipeline.
    pub fn new(
        registry: Arc<ToolRegistry>,
        hooks: Arc<HookManager>,
        max_parallel: usize,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            hooks,
            max_parallel: max_parallel.max(1),
            tool_timeout,
        }
    }

    /// Execute one batch, streaming tool-level events into `sink`.
    ///
    /// Event sequence per call: `tool_execution_start` then `tool_result`
    /// or `tool_error`; the batch is bracketed by `tool_calls_start` and
    /// `tool_calls_complete`. Ordering within the read set is unspecified.
    pub async fn execute_batch(
        &self,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        calls: &[ToolCall],
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let started = Instant::now();
        sink.emit(
            self.event(thread_id, frame, EventKind::ToolCallsStart)
                .with_metadata(json!({"total": calls.len()})),
        )
        .await;

        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut reads: Vec<(usize, ToolCall)> = Vec::new();
        let mut writes: Vec<(usize, ToolCall)> = Vec::new();
        for (i, call) in calls.iter().enumerate() {
            if self.registry.is_read_only(&call.name) {
                reads.push((i, call.clone()));
            } else {
                writes.push((i, call.clone()));
            }
        }

        // Gate the read set up front, then fan out the approved calls.
        let mut approved_reads: Vec<(usize, ToolCall)> = Vec::new();
        for (i, call) in reads {
            if cancel.is_cancelled() {
                return BatchOutcome::Cancelled {
                    completed: collect(slots),
                };
            }
            match self.hooks.before_tool_execution(frame, call).await {
                GateDecision::Proceed(call) => approved_reads.push((i, call)),
                GateDecision::Skip { reason } => {
                    let result = ToolResult::skipped(calls[i].id.clone(), &reason);
                    self.emit_result(thread_id, frame, &calls[i].name, &result, &sink)
                        .await;
                    slots[i] = Some(result);
                }
                GateDecision::Interrupt {
                    reason,
                    requires_user_input,
                } => {
                    return BatchOutcome::Interrupted {
                        reason,
                        requires_user_input,
                        completed: collect(slots),
                    };
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set: JoinSet<(usize, String, ToolResult)> = JoinSet::new();
        for (i, call) in approved_reads {
            let Some(tool) = self.registry.get(&call.name) else {
                // Unreachable in practice: unknown tools partition as writes.
                continue;
            };
            let semaphore = Arc::clone(&semaphore);
            let sink = Arc::clone(&sink);
            let hooks = Arc::clone(&self.hooks);
            let frame = frame.clone();
            let thread_id = thread_id.clone();
            let timeout = self.tool_timeout;
            join_set.spawn(async move {
                // The semaphore is never closed; a failed acquire would
                // only mean shutdown, where unbounded reads are moot.
                let _permit = semaphore.acquire().await.ok();
                sink.emit(
                    Event::new(
                        thread_id.clone(),
                        EventKind::ToolExecutionStart,
                        frame.frame_id.clone(),
                        frame.depth,
                    )
                    .with_content(call.name.clone())
                    .with_metadata(json!({
                        "call_id": &call.id,
                        "read_only": true,
                        "arguments": &call.arguments,
                    })),
                )
                .await;

                let name = call.name.clone();
                let result = run_one(Some(tool), call, timeout).await;
                let result = hooks.after_tool_execution(&frame, result).await;
                emit_result_event(&thread_id, &frame, &name, &result, &sink).await;
                (i, name, result)
            });
        }

        // Barrier: every read finishes before the first write starts.
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, _, result)) => slots[i] = Some(result),
                Err(e) => {
                    tracing::warn!(error = %e, "read-only tool task failed");
                }
            }
        }

        // Side-effecting calls: sequential, in request order.
        for (i, call) in writes {
            if cancel.is_cancelled() {
                return BatchOutcome::Cancelled {
                    completed: collect(slots),
                };
            }

            let call = match self.hooks.before_tool_execution(frame, call).await {
                GateDecision::Proceed(call) => call,
                GateDecision::Skip { reason } => {
                    let result = ToolResult::skipped(calls[i].id.clone(), &reason);
                    self.emit_result(thread_id, frame, &calls[i].name, &result, &sink)
                        .await;
                    slots[i] = Some(result);
                    continue;
                }
                GateDecision::Interrupt {
                    reason,
                    requires_user_input,
                } => {
                    return BatchOutcome::Interrupted {
                        reason,
                        requires_user_input,
                        completed: collect(slots),
                    };
                }
            };

            let tool = self.registry.get(&call.name);
            // A confirmation-requiring tool with no hook pipeline to
            // approve it must pause for a human.
            if tool.as_ref().is_some_and(|t| t.requires_confirmation()) && self.hooks.is_empty() {
                return BatchOutcome::Interrupted {
                    reason: format!("confirmation required: {}", call.name),
                    requires_user_input: true,
                    completed: collect(slots),
                };
            }

            sink.emit(
                self.event(thread_id, frame, EventKind::ToolExecutionStart)
                    .with_content(call.name.clone())
                    .with_metadata(json!({
                        "call_id": &call.id,
                        "read_only": false,
                        "arguments": &call.arguments,
                    })),
            )
            .await;

            let name = call.name.clone();
            let result = run_one(tool, call, self.tool_timeout).await;
            let result = self.hooks.after_tool_execution(frame, result).await;
            self.emit_result(thread_id, frame, &name, &result, &sink).await;
            slots[i] = Some(result);
        }

        let results = collect(slots);
        let stats = BatchStats {
            total: results.len(),
            errors: results.iter().filter(|r| r.is_error).count(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        sink.emit(
            self.event(thread_id, frame, EventKind::ToolCallsComplete)
                .with_metadata(json!({
                    "total": stats.total,
                    "errors": stats.errors,
                    "duration_ms": stats.duration_ms,
                })),
        )
        .await;

        BatchOutcome::Completed { results, stats }
    }

    fn event(&self, thread_id: &ThreadId, frame: &ExecutionFrame, kind: EventKind) -> Event {
        Event::new(thread_id.clone(), kind, frame.frame_id.clone(), frame.depth)
    }

    async fn emit_result(
        &self,
        thread_id: &ThreadId,
        frame: &ExecutionFrame,
        tool: &str,
        result: &ToolResult,
        sink: &Arc<dyn EventSink>,
    ) {
        emit_result_event(thread_id, frame, tool, result, sink).await;
    }
}

async fn emit_result_event(
    thread_id: &ThreadId,
    frame: &ExecutionFrame,
    tool: &str,
    result: &ToolResult,
    sink: &Arc<dyn EventSink>,
) {
    let kind = if result.is_error {
        EventKind::ToolError
    } else {
        EventKind::ToolResult
    };
    sink.emit(
        Event::new(thread_id.clone(), kind, frame.frame_id.clone(), frame.depth)
            .with_content(result.content.clone())
            .with_metadata(json!({"tool": tool, "result": result})),
    )
    .await;
}

/// Run a single call under the per-tool timeout.
async fn run_one(tool: Option<Arc<dyn Tool>>, call: ToolCall, timeout: Duration) -> ToolResult {
    let started = Instant::now();
    let Some(tool) = tool else {
        return ToolResult::error(
            call.id,
            format!("tool not found: {}", call.name),
            ErrorKind::UnknownTool,
            started.elapsed().as_millis() as u64,
        );
    };

    match tokio::time::timeout(timeout, tool.invoke(call.arguments)).await {
        Ok(Ok(content)) => ToolResult::ok(call.id, content, started.elapsed().as_millis() as u64),
        Ok(Err(e)) => ToolResult::error(
            call.id,
            e.to_string(),
            e.kind(),
            started.elapsed().as_millis() as u64,
        ),
        Err(_) => ToolResult::error(
            call.id,
            format!("timed out after {}ms", timeout.as_millis()),
            ErrorKind::ToolTimeout,
            started.elapsed().as_millis() as u64,
        ),
    }
}

fn collect(slots: Vec<Option<ToolResult>>) -> Vec<ToolResult> {
    slots.into_iter().flatten().collect()
}
