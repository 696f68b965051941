#![deny(missing_docs)]
//! Tool registry and batch orchestration for axon.
//!
//! [`ToolRegistry`] holds tools as `Arc<dyn Tool>` keyed by name.
//! [`ToolOrchestrator`] executes one batch of model-requested calls:
//! read-only calls run concurrently under a semaphore, side-effecting
//! calls run sequentially after a barrier, and every call is gated by the
//! hook pipeline and wrapped in a timeout.

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{BatchOutcome, BatchStats, ToolOrchestrator};
pub use registry::ToolRegistry;
