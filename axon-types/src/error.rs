//! Error types for each component boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of failures, carried on error results and `error` events.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A tool exceeded its deadline.
    ToolTimeout,
    /// A tool returned a failure.
    ToolExecution,
    /// The model call timed out.
    LlmTimeout,
    /// The model call failed in transport.
    LlmTransport,
    /// Critical context components exceed the token budget.
    ContextOverflow,
    /// The journal append failed after retries.
    JournalWrite,
    /// A hook requested a human-in-the-loop pause.
    Interrupted,
    /// The cancellation token tripped.
    Cancelled,
    /// The recursion monitor fired.
    RecursionTerminated,
    /// A hook threw; demoted to a warning and the hook is bypassed.
    HookError,
    /// The model requested a tool that is not registered.
    UnknownTool,
}

impl ErrorKind {
    /// Whether the engine attempts automatic recovery for this kind.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::LlmTimeout | ErrorKind::LlmTransport)
    }
}

/// Frame serialization errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrameError {
    /// Checkpoint bytes could not be encoded or decoded.
    #[error("checkpoint serialization failed: {0}")]
    Serialization(String),

    /// The checkpoint envelope carries an unsupported version.
    #[error("unsupported checkpoint version: {0}")]
    UnsupportedVersion(u32),
}

/// Journal errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum JournalError {
    /// An append failed after in-process retries.
    #[error("journal write failed: {0}")]
    WriteFailed(String),

    /// Replaying a thread's log failed.
    #[error("journal replay failed: {0}")]
    ReplayFailed(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from tool implementations and the registry.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The input provided to the tool was invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ToolError {
    /// The [`ErrorKind`] recorded on the result built from this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::NotFound(_) => ErrorKind::UnknownTool,
            _ => ErrorKind::ToolExecution,
        }
    }
}

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_)
        )
    }
}

/// Hook errors. These are logged but do NOT halt the engine — the failing
/// hook is bypassed for the remainder of the run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook execution failed.
    #[error("hook failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Memory tier and index errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The compressor could not produce summaries within the target.
    #[error("compression failed: {0}")]
    Compression(String),

    /// The vector index rejected an operation.
    #[error("index error: {0}")]
    Index(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Context assembly errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContextError {
    /// Critical components alone exceed the budget; assembly cannot proceed.
    #[error("critical components require {required} tokens, budget is {budget}")]
    Overflow {
        /// Combined token estimate of the critical components.
        required: usize,
        /// The configured budget.
        budget: usize,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level engine errors surfaced by the blocking convenience API.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The journal failed fatally.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// Context assembly failed fatally.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// The model call failed after retries.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A hook paused execution for human input.
    #[error("interrupted: {reason}")]
    Interrupted {
        /// Why the hook paused execution.
        reason: String,
    },

    /// The cancellation token tripped.
    #[error("cancelled")]
    Cancelled,

    /// The recursion monitor terminated the run.
    #[error("recursion terminated: {reason}")]
    Terminated {
        /// Which predicate fired.
        reason: String,
    },

    /// The run ended without a final response.
    #[error("run ended without a final response")]
    NoResponse,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
