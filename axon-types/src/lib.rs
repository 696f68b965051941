//! # axon-types — protocol types for the axon agent engine
//!
//! This crate defines the shared data model and the capability traits that
//! the engine's components compose around.
//!
//! ## The data model
//!
//! | Concern | Types |
//! |---------|-------|
//! | Identity | [`FrameId`], [`EventId`], [`ThreadId`], [`ToolCallId`], [`EntryId`] |
//! | Execution state | [`ExecutionFrame`], [`Phase`] |
//! | History | [`Event`], [`EventKind`] |
//! | Conversation | [`Message`], [`Role`] |
//! | Tool traffic | [`ToolCall`], [`ToolResult`] |
//! | Context build | [`ContextComponent`], [`ComponentDecision`], [`ContextMetadata`] |
//!
//! ## The capability traits
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`LlmProvider`] | Model backends (Anthropic, OpenAI, local, mocks) |
//! | [`Tool`] | Anything the model may invoke |
//! | [`LifecycleHook`] | Observers and interceptors of the execution loop |
//!
//! ## Design Principle
//!
//! Every trait is operation-defined, not mechanism-defined. `stream_chat`
//! means "cause the model to produce a streamed response" — not "make an
//! HTTP request". This is what makes implementations swappable: an API
//! client, a local inference server, and a scripted test double all
//! implement the same trait.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for extension data fields
//! (event metadata, tool arguments, input schemas). JSON is the universal
//! interchange format for agentic systems, and `serde_json::Value` is the
//! de facto standard in the Rust ecosystem.

#![deny(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod frame;
pub mod hook;
pub mod id;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-exports for convenience
pub use config::EngineConfig;
pub use context::{
    ComponentDecision, ContextComponent, ContextMetadata, priority, estimate_tokens,
};
pub use error::{
    ContextError, EngineError, ErrorKind, FrameError, HookError, JournalError, MemoryError,
    ProviderError, ToolError,
};
pub use event::{Event, EventKind, EventSink};
pub use frame::{CHECKPOINT_VERSION, ExecutionFrame, Phase, ROLLING_WINDOW};
pub use hook::{LifecycleHook, ToolGate};
pub use id::{EntryId, EventId, FrameId, ThreadId, ToolCallId};
pub use memory::{
    Compressor, EntrySource, ImportanceScorer, IndexHit, MemoryEntry, Tier, VectorIndex,
};
pub use message::{Message, Role};
pub use provider::{ChatRequest, ChatStream, LlmProvider, StreamItem, ToolSchema};
pub use tool::{Tool, ToolCall, ToolResult};
