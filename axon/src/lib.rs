#![deny(missing_docs)]
//! # axon — umbrella crate
//!
//! Provides a single import surface for the axon engine. Re-exports the
//! member crates behind feature flags, plus a `prelude` for the happy
//! path.

#[cfg(feature = "engine")]
pub use axon_engine;
#[cfg(feature = "core")]
pub use axon_hooks;
#[cfg(feature = "core")]
pub use axon_journal;
#[cfg(feature = "core")]
pub use axon_memory;
#[cfg(feature = "core")]
pub use axon_tool;
#[cfg(feature = "core")]
pub use axon_types;

/// Happy-path imports for composing an agent.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use axon_types::{
        ChatRequest, ChatStream, ContextComponent, EngineConfig, EngineError, Event, EventKind,
        ExecutionFrame, FrameId, LifecycleHook, LlmProvider, Message, Phase, ProviderError, Role,
        StreamItem, ThreadId, Tool, ToolCall, ToolCallId, ToolGate, ToolResult, ToolSchema,
    };

    #[cfg(feature = "core")]
    pub use axon_hooks::{GateDecision, HookManager};

    #[cfg(feature = "core")]
    pub use axon_journal::{Journal, JournalConfig, Reconstructor};

    #[cfg(feature = "core")]
    pub use axon_memory::{
        ContextAssembler, ExtractiveCompressor, LayeredMemory, MemoryConfig, RuleBasedScorer,
    };

    #[cfg(feature = "core")]
    pub use axon_tool::{BatchOutcome, ToolOrchestrator, ToolRegistry};

    #[cfg(feature = "engine")]
    pub use axon_engine::{Agent, Capabilities, DefaultTaskHandler, ExecuteOptions, TaskHandler};
}
