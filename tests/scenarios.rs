//! End-to-end scenarios over the full engine: scripted provider, real
//! journal on disk, real memory, real orchestration.

use async_trait::async_trait;
use axon_engine::{Agent, Capabilities, ExecuteOptions};
use axon_journal::{Journal, JournalConfig, Reconstructor};
use axon_memory::{ExtractiveCompressor, LayeredMemory, MemoryConfig, RuleBasedScorer};
use axon_types::{
    ChatRequest, ChatStream, EngineConfig, ErrorKind, Event, EventKind, ExecutionFrame, HookError,
    LifecycleHook, LlmProvider, Message, Phase, ProviderError, StreamItem, ThreadId, Tool,
    ToolCall, ToolCallId, ToolError, ToolGate,
};
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Plays back queued turns; one turn per model call.
struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<StreamItem>>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<Vec<StreamItem>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, ProviderError> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))?;
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}

fn text_turn(text: &str) -> Vec<StreamItem> {
    vec![StreamItem::TextDelta(text.to_string()), StreamItem::Done]
}

fn tool_turn(text: &str, calls: Vec<(&str, &str, serde_json::Value)>) -> Vec<StreamItem> {
    let mut items = Vec::new();
    if !text.is_empty() {
        items.push(StreamItem::TextDelta(text.to_string()));
    }
    for (id, name, arguments) in calls {
        items.push(StreamItem::ToolCall(ToolCall {
            id: ToolCallId::new(id),
            name: name.to_string(),
            arguments,
        }));
    }
    items.push(StreamItem::Done);
    items
}

struct ReadFileTool {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Reads a file"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"path": {"type": "string"}}})
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let path = arguments.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        Ok(format!("contents of {path}"))
    }
}

struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Writes a file"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok("written".into())
    }
}

struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Searches"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok("no new results".into())
    }
}

struct DeleteFileTool {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }
    fn description(&self) -> &str {
        "Deletes a file"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok("deleted".into())
    }
}

/// HITL gate: interrupts `delete_file` until approved.
struct ConfirmDeletes {
    approved: Arc<AtomicBool>,
}

#[async_trait]
impl LifecycleHook for ConfirmDeletes {
    fn name(&self) -> &str {
        "confirm-deletes"
    }
    async fn before_tool_execution(
        &self,
        _frame: &ExecutionFrame,
        call: &ToolCall,
    ) -> Result<ToolGate, HookError> {
        if call.name == "delete_file" && !self.approved.load(Ordering::SeqCst) {
            Ok(ToolGate::Interrupt {
                reason: "confirm delete".into(),
                requires_user_input: true,
            })
        } else {
            Ok(ToolGate::Proceed(None))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fresh_memory() -> LayeredMemory {
    LayeredMemory::new(
        MemoryConfig::default(),
        Arc::new(RuleBasedScorer),
        Arc::new(ExtractiveCompressor::default()),
        None,
    )
}

fn agent_with(
    provider: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn Tool>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    journal_root: &Path,
    config: EngineConfig,
) -> Agent {
    let mut capabilities = Capabilities::new(
        provider,
        Journal::new(journal_root, JournalConfig::default()),
        fresh_memory(),
    );
    for tool in tools {
        capabilities.tools.register(tool);
    }
    for hook in hooks {
        capabilities.hooks.add(hook);
    }
    Agent::new(capabilities, config)
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<Event>) -> Vec<Event> {
    tokio::time::timeout(Duration::from_secs(30), async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("run did not terminate")
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1: trivial completion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn trivial_completion_emits_the_exact_event_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("hello")]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );
    let thread = ThreadId::new("trivial");

    let rx = agent
        .execute(
            "say hi",
            ExecuteOptions::default().with_thread_id(thread.clone()),
        )
        .await;
    let events = drain(rx).await;

    let expected = vec![
        EventKind::IterationStart,
        EventKind::ContextAssemblyStart,
        EventKind::ContextAssemblyComplete,
        EventKind::LlmStart,
        EventKind::LlmDelta,
        EventKind::LlmComplete,
        EventKind::AgentFinish,
    ];
    assert_eq!(kinds(&events), expected);
    assert_eq!(events[4].content, "hello");
    assert_eq!(events.last().unwrap().content, "hello");

    // The journal holds exactly the same events.
    let journal = Journal::new(dir.path(), JournalConfig::default());
    let replayed = journal.replay(&thread, None).await.unwrap();
    assert_eq!(kinds(&replayed), expected);
    for (live, stored) in events.iter().zip(&replayed) {
        assert_eq!(live.event_id, stored.event_id);
        assert_eq!(live.content, stored.content);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2: single read-only tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_read_tool_runs_two_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("reading", vec![("tc_1", "read_file", json!({"path": "X"}))]),
            text_turn("done"),
        ]),
        vec![Arc::new(ReadFileTool {
            invocations: invocations.clone(),
        })],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );
    let thread = ThreadId::new("single-read");

    let rx = agent
        .execute(
            "read file X",
            ExecuteOptions::default().with_thread_id(thread.clone()),
        )
        .await;
    let events = drain(rx).await;
    let ks = kinds(&events);

    // Exactly one start/result pair between the batch brackets.
    let batch_start = ks.iter().position(|k| *k == EventKind::ToolCallsStart).unwrap();
    let batch_end = ks
        .iter()
        .position(|k| *k == EventKind::ToolCallsComplete)
        .unwrap();
    let inside = &ks[batch_start + 1..batch_end];
    assert_eq!(
        inside
            .iter()
            .filter(|k| **k == EventKind::ToolExecutionStart)
            .count(),
        1
    );
    assert_eq!(
        inside.iter().filter(|k| **k == EventKind::ToolResult).count(),
        1
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // Two iterations; finish at depth 1 with "done".
    assert_eq!(
        ks.iter().filter(|k| **k == EventKind::IterationStart).count(),
        2
    );
    let finish = events.last().unwrap();
    assert_eq!(finish.kind, EventKind::AgentFinish);
    assert_eq!(finish.content, "done");
    assert_eq!(finish.depth, 1);

    let journal = Journal::new(dir.path(), JournalConfig::default());
    let replayed = journal.replay(&thread, None).await.unwrap();
    let (frame, meta) = Reconstructor::reconstruct(&replayed).unwrap();
    assert_eq!(frame.depth, 1);
    assert_eq!(frame.phase, Phase::Completed);
    assert_eq!(meta.iterations, 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3: parallel reads, then write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn reads_complete_before_the_write_starts() {
    let dir = tempfile::tempdir().unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn(
                "",
                vec![
                    ("tc_1", "read_file", json!({"path": "A"})),
                    ("tc_2", "read_file", json!({"path": "B"})),
                    ("tc_3", "write_file", json!({"path": "C", "content": "x"})),
                ],
            ),
            text_turn("done"),
        ]),
        vec![
            Arc::new(ReadFileTool {
                invocations: invocations.clone(),
            }),
            Arc::new(WriteFileTool),
        ],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );

    let rx = agent.execute("sync the files", ExecuteOptions::default()).await;
    let events = drain(rx).await;

    let write_start = events
        .iter()
        .position(|e| e.kind == EventKind::ToolExecutionStart && e.content == "write_file")
        .expect("write never started");
    let read_results: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EventKind::ToolResult && e.content.starts_with("contents of"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(read_results.len(), 2);
    assert!(
        read_results.iter().all(|&i| i < write_start),
        "a read result landed after the write started"
    );
    assert_eq!(events.last().unwrap().kind, EventKind::AgentFinish);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4: loop termination on duplicate tool calls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn repeated_identical_tool_calls_terminate_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let same_call = || tool_turn("", vec![("tc", "search", json!({"q": "foo"}))]);
    let agent = agent_with(
        ScriptedProvider::new(vec![
            same_call(),
            same_call(),
            same_call(),
            same_call(),
            same_call(),
        ]),
        vec![Arc::new(SearchTool)],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );

    let rx = agent.execute("find foo", ExecuteOptions::default()).await;
    let events = drain(rx).await;

    let terminal = events.last().unwrap();
    assert_eq!(terminal.kind, EventKind::RecursionTerminated);
    assert_eq!(terminal.content, "duplicate_tools");

    // Termination happened in Phase 0 of iteration 4: three batches ran,
    // and nothing model- or tool-related follows the terminal event.
    let batches = events
        .iter()
        .filter(|e| e.kind == EventKind::ToolCallsComplete)
        .count();
    assert_eq!(batches, 3);
    let terminal_at = events.len() - 1;
    assert!(
        events[..terminal_at]
            .iter()
            .all(|e| !e.kind.is_terminal()),
        "terminal event was not unique"
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5: HITL interrupt, then resume
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn interrupt_checkpoints_and_resume_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let approved = Arc::new(AtomicBool::new(false));
    let deletions = Arc::new(AtomicUsize::new(0));
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("removing", vec![("tc_1", "delete_file", json!({"path": "X"}))]),
            text_turn("done"),
        ]),
        vec![Arc::new(DeleteFileTool {
            invocations: deletions.clone(),
        })],
        vec![Arc::new(ConfirmDeletes {
            approved: approved.clone(),
        })],
        dir.path(),
        EngineConfig::default(),
    );
    let thread = ThreadId::new("hitl");

    let rx = agent
        .execute(
            "delete file X",
            ExecuteOptions::default().with_thread_id(thread.clone()),
        )
        .await;
    let first_run = drain(rx).await;

    let interrupted = first_run.last().unwrap();
    assert_eq!(interrupted.kind, EventKind::ExecutionInterrupted);
    assert_eq!(interrupted.content, "confirm delete");
    assert_eq!(deletions.load(Ordering::SeqCst), 0);

    // The journal holds everything up to and including the interrupt.
    let journal = Journal::new(dir.path(), JournalConfig::default());
    let replayed = journal.replay(&thread, None).await.unwrap();
    assert_eq!(
        replayed.last().unwrap().kind,
        EventKind::ExecutionInterrupted
    );

    // Approve and resume: only the remaining events are streamed.
    approved.store(true, Ordering::SeqCst);
    let rx = agent
        .resume(thread.clone(), ExecuteOptions::default())
        .await
        .unwrap();
    let resumed = drain(rx).await;

    assert!(
        resumed
            .iter()
            .all(|e| e.kind != EventKind::ExecutionInterrupted),
        "pre-interrupt events were re-emitted"
    );
    assert_eq!(resumed.first().unwrap().kind, EventKind::ToolCallsStart);
    let finish = resumed.last().unwrap();
    assert_eq!(finish.kind, EventKind::AgentFinish);
    assert_eq!(finish.content, "done");
    assert_eq!(deletions.load(Ordering::SeqCst), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 6: crash recovery mid-iteration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Journal the prefix of a run that died after `tool_result` landed but
/// before `recursion`, then resume and compare against a clean oracle.
#[tokio::test]
async fn crash_after_tool_result_resumes_at_recursion() {
    let dir = tempfile::tempdir().unwrap();
    let thread = ThreadId::new("crashed");
    let journal = Journal::new(dir.path(), JournalConfig::default());

    let root = ExecutionFrame::initial("read file X", 10);
    let call = ToolCall {
        id: ToolCallId::new("tc_1"),
        name: "read_file".into(),
        arguments: json!({"path": "X"}),
    };
    let result = axon_types::ToolResult::ok(ToolCallId::new("tc_1"), "contents of X", 2);

    let ev = |kind, frame_id: &axon_types::FrameId, depth| {
        Event::new(thread.clone(), kind, frame_id.clone(), depth)
    };
    let prefix = vec![
        ev(EventKind::IterationStart, &root.frame_id, 0).with_metadata(json!({
            "messages": &root.messages,
            "max_iterations": root.max_iterations,
            "error_count": 0,
            "tool_call_history": [],
            "last_outputs": [],
            "parent_frame_id": null,
        })),
        ev(EventKind::ContextAssemblyStart, &root.frame_id, 0),
        ev(EventKind::ContextAssemblyComplete, &root.frame_id, 0),
        ev(EventKind::LlmStart, &root.frame_id, 0),
        ev(EventKind::LlmComplete, &root.frame_id, 0).with_content("reading"),
        ev(EventKind::LlmToolCalls, &root.frame_id, 0).with_metadata(json!({"calls": [&call]})),
        ev(EventKind::ToolCallsStart, &root.frame_id, 0),
        ev(EventKind::ToolExecutionStart, &root.frame_id, 0).with_content("read_file"),
        ev(EventKind::ToolResult, &root.frame_id, 0)
            .with_content("contents of X")
            .with_metadata(json!({"tool": "read_file", "result": &result})),
        ev(EventKind::ToolCallsComplete, &root.frame_id, 0)
            .with_metadata(json!({"total": 1, "errors": 0, "duration_ms": 2})),
        // Crash: no recursion event, no second iteration.
    ];
    for event in &prefix {
        journal.append(event).await.unwrap();
    }
    journal.shutdown().await.unwrap();

    // Restarted process: same capabilities, fresh journal handle.
    let invocations = Arc::new(AtomicUsize::new(0));
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("done")]),
        vec![Arc::new(ReadFileTool {
            invocations: invocations.clone(),
        })],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );

    let rx = agent
        .resume(thread.clone(), ExecuteOptions::default())
        .await
        .unwrap();
    let resumed = drain(rx).await;

    // The tool result was already journaled: re-entry is at Phase 5, so
    // the tool does not run again.
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(resumed.first().unwrap().kind, EventKind::Recursion);
    let finish = resumed.last().unwrap();
    assert_eq!(finish.kind, EventKind::AgentFinish);
    assert_eq!(finish.content, "done");
    assert_eq!(finish.depth, 1);

    // Oracle: a clean run with the same script ends the same way.
    let oracle_dir = tempfile::tempdir().unwrap();
    let oracle = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("reading", vec![("tc_1", "read_file", json!({"path": "X"}))]),
            text_turn("done"),
        ]),
        vec![Arc::new(ReadFileTool {
            invocations: Arc::new(AtomicUsize::new(0)),
        })],
        vec![],
        oracle_dir.path(),
        EngineConfig::default(),
    );
    let oracle_events = drain(oracle.execute("read file X", ExecuteOptions::default()).await).await;
    let oracle_finish = oracle_events.last().unwrap();
    assert_eq!(oracle_finish.kind, EventKind::AgentFinish);
    assert_eq!(oracle_finish.content, finish.content);
    assert_eq!(oracle_finish.depth, finish.depth);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary behaviors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn zero_max_iterations_stops_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("never called")]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default().with_max_iterations(0),
    );

    let events = drain(agent.execute("anything", ExecuteOptions::default()).await).await;
    assert_eq!(
        kinds(&events),
        vec![EventKind::IterationStart, EventKind::MaxIterationsReached]
    );
}

#[tokio::test]
async fn unknown_tool_produces_error_result_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("trying", vec![("tc_1", "no_such_tool", json!({}))]),
            text_turn("recovered"),
        ]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );

    let events = drain(agent.execute("use a tool", ExecuteOptions::default()).await).await;
    let error_event = events
        .iter()
        .find(|e| e.kind == EventKind::ToolError)
        .expect("no tool_error event");
    let result: axon_types::ToolResult =
        serde_json::from_value(error_event.metadata["result"].clone()).unwrap();
    assert!(result.is_error);
    assert_eq!(result.error_kind, Some(ErrorKind::UnknownTool));
    assert_eq!(events.last().unwrap().kind, EventKind::AgentFinish);
    assert_eq!(events.last().unwrap().content, "recovered");
}

#[tokio::test]
async fn empty_conversation_still_runs_one_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("hello anyway")]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );

    let events = drain(agent.execute("", ExecuteOptions::default()).await).await;
    assert_eq!(events.last().unwrap().kind, EventKind::AgentFinish);
    assert!(events.iter().any(|e| e.kind == EventKind::ContextAssemblyComplete));
}

#[tokio::test]
async fn cancellation_token_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("never")]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let events = drain(
        agent
            .execute("task", ExecuteOptions::default().with_cancel(cancel))
            .await,
    )
    .await;
    assert_eq!(kinds(&events), vec![EventKind::ExecutionCancelled]);
}

#[tokio::test]
async fn run_collects_the_final_answer() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![text_turn("forty-two")]),
        vec![],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );
    let answer = agent.run("the question").await.unwrap();
    assert_eq!(answer, "forty-two");
}

#[tokio::test]
async fn guidance_message_lands_after_tool_messages() {
    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("reading", vec![("tc_1", "read_file", json!({"path": "X"}))]),
            text_turn("done"),
        ]),
        vec![Arc::new(ReadFileTool {
            invocations: Arc::new(AtomicUsize::new(0)),
        })],
        vec![],
        dir.path(),
        EngineConfig::default(),
    );
    let thread = ThreadId::new("guidance");

    drain(
        agent
            .execute(
                "read file X",
                ExecuteOptions::default().with_thread_id(thread.clone()),
            )
            .await,
    )
    .await;

    let journal = Journal::new(dir.path(), JournalConfig::default());
    let replayed = journal.replay(&thread, None).await.unwrap();
    let recursion = replayed
        .iter()
        .find(|e| e.kind == EventKind::Recursion)
        .unwrap();
    let messages: Vec<Message> =
        serde_json::from_value(recursion.metadata["messages"].clone()).unwrap();

    let tool_at = messages
        .iter()
        .position(|m| m.role == axon_types::Role::Tool)
        .expect("no tool message");
    let guidance_at = messages
        .iter()
        .rposition(|m| m.role == axon_types::Role::System)
        .expect("no guidance message");
    assert!(guidance_at > tool_at, "guidance preceded the tool messages");
}

#[tokio::test]
async fn tool_timeout_is_classified_and_non_fatal() {
    struct StuckTool;

    #[async_trait]
    impl Tool for StuckTool {
        fn name(&self) -> &str {
            "stuck"
        }
        fn description(&self) -> &str {
            "never returns"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn is_read_only(&self) -> bool {
            true
        }
        async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("unreachable".into())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let agent = agent_with(
        ScriptedProvider::new(vec![
            tool_turn("calling", vec![("tc_1", "stuck", json!({}))]),
            text_turn("moved on"),
        ]),
        vec![Arc::new(StuckTool)],
        vec![],
        dir.path(),
        EngineConfig::default().with_tool_timeout_ms(50),
    );

    let events = drain(agent.execute("get stuck", ExecuteOptions::default()).await).await;
    let error_event = events
        .iter()
        .find(|e| e.kind == EventKind::ToolError)
        .expect("no tool_error event");
    let result: axon_types::ToolResult =
        serde_json::from_value(error_event.metadata["result"].clone()).unwrap();
    assert_eq!(result.error_kind, Some(ErrorKind::ToolTimeout));
    assert_eq!(events.last().unwrap().kind, EventKind::AgentFinish);
}
