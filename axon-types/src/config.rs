//! Engine configuration.

use serde::{Deserialize, Serialize};

/// The recognized engine options. Every field has the documented default;
/// construct with `EngineConfig::default()` and override what you need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap on recursion depth.
    pub max_iterations: u32,
    /// Context assembler token budget.
    pub max_context_tokens: usize,
    /// Assembler safety margin: the fast path applies at `budget × ratio`.
    pub token_buffer_ratio: f64,
    /// Concurrent read-only tool executions.
    pub max_parallel_read_tools: usize,
    /// Per-tool deadline in milliseconds.
    pub tool_timeout_ms: u64,
    /// Per-iteration model-call deadline in milliseconds.
    pub llm_timeout_ms: u64,
    /// Journal buffer size that forces a flush.
    pub journal_batch_size: usize,
    /// Journal flush interval in milliseconds.
    pub journal_flush_interval_ms: u64,
    /// L1 ring capacity.
    pub l1_capacity: usize,
    /// L2 priority-queue capacity.
    pub l2_capacity: usize,
    /// Importance threshold for promotion into L2.
    pub l2_promotion_threshold: f64,
    /// Identical trailing tool calls that terminate the run.
    pub recursion_duplicate_threshold: usize,
    /// Output window examined for short-period repetition.
    pub recursion_loop_window: usize,
    /// Tool-error rate that terminates the run.
    pub recursion_error_rate_threshold: f64,
    /// Fraction of a termination predicate at which a soft warning is
    /// injected into the conversation.
    pub recursion_warning_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_context_tokens: 8192,
            token_buffer_ratio: 0.9,
            max_parallel_read_tools: 5,
            tool_timeout_ms: 30_000,
            llm_timeout_ms: 120_000,
            journal_batch_size: 100,
            journal_flush_interval_ms: 5_000,
            l1_capacity: 50,
            l2_capacity: 100,
            l2_promotion_threshold: 0.6,
            recursion_duplicate_threshold: 3,
            recursion_loop_window: 5,
            recursion_error_rate_threshold: 0.5,
            recursion_warning_ratio: 0.8,
        }
    }
}

impl EngineConfig {
    /// Override the recursion depth cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the assembler token budget.
    pub fn with_max_context_tokens(mut self, max_context_tokens: usize) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    /// Override the per-tool deadline.
    pub fn with_tool_timeout_ms(mut self, tool_timeout_ms: u64) -> Self {
        self.tool_timeout_ms = tool_timeout_ms;
        self
    }

    /// Override the per-call model deadline.
    pub fn with_llm_timeout_ms(mut self, llm_timeout_ms: u64) -> Self {
        self.llm_timeout_ms = llm_timeout_ms;
        self
    }
}
