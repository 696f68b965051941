//! The public agent API: execute, resume, run.

use crate::engine::{Bus, EngineCore, entry_for};
use crate::guidance::{DefaultTaskHandler, TaskHandler};
use axon_hooks::HookManager;
use axon_journal::{Journal, Reconstructor};
use axon_memory::LayeredMemory;
use axon_tool::ToolRegistry;
use axon_types::{
    EngineConfig, EngineError, EntrySource, Event, EventKind, ExecutionFrame, JournalError,
    LlmProvider, ThreadId,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The injectable capability providers, bundled for construction. No
/// module-level registries: everything the engine touches comes in here.
pub struct Capabilities {
    /// The model backend.
    pub provider: Arc<dyn LlmProvider>,
    /// Tools the model may call.
    pub tools: ToolRegistry,
    /// Lifecycle hook pipeline.
    pub hooks: HookManager,
    /// The agent's layered memory.
    pub memory: LayeredMemory,
    /// The event journal.
    pub journal: Journal,
    /// Feedback guidance handlers, consulted in order.
    pub handlers: Vec<Arc<dyn TaskHandler>>,
    /// Base system prompt (critical context component).
    pub system_prompt: String,
}

impl Capabilities {
    /// Bundle the required capabilities; tools, hooks, and the system
    /// prompt start empty, and guidance falls back to
    /// [`DefaultTaskHandler`].
    pub fn new(provider: Arc<dyn LlmProvider>, journal: Journal, memory: LayeredMemory) -> Self {
        Self {
            provider,
            tools: ToolRegistry::new(),
            hooks: HookManager::new(),
            memory,
            journal,
            handlers: vec![Arc::new(DefaultTaskHandler)],
            system_prompt: String::new(),
        }
    }
}

/// Per-call options for [`Agent::execute`] and [`Agent::resume`].
#[derive(Default)]
pub struct ExecuteOptions {
    /// Thread to run under; a fresh id is minted when absent.
    pub thread_id: Option<ThreadId>,
    /// Cooperative cancellation token.
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    /// Run under a specific thread id.
    pub fn with_thread_id(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// An agent instance: the recursive engine plus its capabilities.
pub struct Agent {
    core: Arc<EngineCore>,
}

impl Agent {
    /// Build an agent from its capabilities and configuration.
    pub fn new(capabilities: Capabilities, config: EngineConfig) -> Self {
        Self {
            core: Arc::new(EngineCore {
                provider: capabilities.provider,
                registry: Arc::new(capabilities.tools),
                hooks: Arc::new(capabilities.hooks),
                memory: Arc::new(tokio::sync::Mutex::new(capabilities.memory)),
                journal: Arc::new(capabilities.journal),
                handlers: capabilities.handlers,
                config,
                system_prompt: capabilities.system_prompt,
            }),
        }
    }

    /// Start a run and stream its events. The stream ends after exactly
    /// one terminal event (`agent_finish`, `recursion_terminated`,
    /// `max_iterations_reached`, `execution_interrupted`,
    /// `execution_cancelled`, or `error`).
    pub async fn execute(
        &self,
        user_input: impl Into<String>,
        options: ExecuteOptions,
    ) -> mpsc::Receiver<Event> {
        let user_input = user_input.into();
        let thread_id = options.thread_id.unwrap_or_else(ThreadId::generate);
        let cancel = options.cancel.unwrap_or_default();
        let (tx, rx) = mpsc::channel(256);

        let frame = ExecutionFrame::initial(&user_input, self.core.config.max_iterations);
        self.core
            .memory
            .lock()
            .await
            .record(EntrySource::UserTurn, user_input, None, false);

        let bus = Arc::new(Bus::new(
            thread_id.clone(),
            Arc::clone(&self.core.journal),
            tx,
        ));
        let core = Arc::clone(&self.core);
        let entry = entry_for(&frame);
        tokio::spawn(async move { core.run_loop(thread_id, frame, bus, cancel, entry).await });
        rx
    }

    /// Resume a crashed or interrupted thread from its journal. The
    /// pre-interrupt events are not re-emitted; the stream carries only
    /// what happens from the reconstructed frame onward.
    pub async fn resume(
        &self,
        thread_id: ThreadId,
        options: ExecuteOptions,
    ) -> Result<mpsc::Receiver<Event>, EngineError> {
        let events = self.core.journal.replay(&thread_id, None).await?;
        if events.is_empty() {
            return Err(EngineError::Journal(JournalError::ReplayFailed(format!(
                "no journaled events for thread {thread_id}"
            ))));
        }
        let (frame, meta) = Reconstructor::reconstruct(&events)?;
        if meta.terminal == Some(EventKind::AgentFinish) {
            return Err(EngineError::Terminated {
                reason: "thread already completed".into(),
            });
        }

        let cancel = options.cancel.unwrap_or_default();
        let (tx, rx) = mpsc::channel(256);
        let bus = Arc::new(Bus::new(
            thread_id.clone(),
            Arc::clone(&self.core.journal),
            tx,
        ));
        let core = Arc::clone(&self.core);
        let entry = entry_for(&frame);
        tokio::spawn(async move { core.run_loop(thread_id, frame, bus, cancel, entry).await });
        Ok(rx)
    }

    /// Convenience: run to completion and return the final answer.
    pub async fn run(&self, user_input: impl Into<String>) -> Result<String, EngineError> {
        let mut rx = self.execute(user_input, ExecuteOptions::default()).await;
        let mut answer = None;
        while let Some(event) = rx.recv().await {
            match event.kind {
                EventKind::AgentFinish => answer = Some(event.content),
                EventKind::ExecutionInterrupted => {
                    return Err(EngineError::Interrupted {
                        reason: event.content,
                    });
                }
                EventKind::ExecutionCancelled => return Err(EngineError::Cancelled),
                EventKind::RecursionTerminated | EventKind::MaxIterationsReached => {
                    return Err(EngineError::Terminated {
                        reason: event.content,
                    });
                }
                EventKind::Error => {
                    return Err(EngineError::Other(event.content.into()));
                }
                _ => {}
            }
        }
        answer.ok_or(EngineError::NoResponse)
    }

    /// Final-flush the journal. Call before process exit.
    pub async fn shutdown(&self) -> Result<(), JournalError> {
        self.core.journal.shutdown().await
    }
}
