//! The recursive execution engine for axon.
//!
//! [`Agent`] is the public entry point: [`execute`](Agent::execute)
//! streams events for a fresh run, [`resume`](Agent::resume) continues a
//! crashed or interrupted thread from its journal, and [`run`](Agent::run)
//! collects a final answer. Internally each iteration walks five phases —
//! recursion control, context assembly, model call, decision, tool
//! execution — and tail-recurses by producing the successor frame.

pub mod agent;
mod engine;
pub mod guidance;
pub mod monitor;

pub use agent::{Agent, Capabilities, ExecuteOptions};
pub use guidance::{DefaultTaskHandler, ResultAnalysis, TaskHandler, analyze, guidance_for};
pub use monitor::{MonitorVerdict, RecursionMonitor};
