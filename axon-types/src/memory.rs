//! Memory entries and the pluggable memory capability traits.

use crate::error::MemoryError;
use crate::id::EntryId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory layer, from raw recency (L1) to vector-indexed recall (L4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Bounded FIFO ring of raw recent turns and tool I/O.
    L1,
    /// Importance-ordered working set promoted from L1.
    L2,
    /// Compressed textual summaries of L2 items.
    L3,
    /// Embedded summaries in an external vector index.
    L4,
}

/// What kind of action produced a memory entry. Drives the default
/// importance table.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// A user turn.
    UserTurn,
    /// An assistant response.
    AssistantOutput,
    /// A tool result.
    ToolResult,
    /// An error or failure record.
    Error,
    /// A planning note.
    Planning,
    /// A summary produced by compression.
    Summary,
    /// Anything else.
    Other,
}

/// One item of layered memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Stable identifier; tiers reference entries by id.
    pub entry_id: EntryId,
    /// The remembered text.
    pub content: String,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// The highest tier currently holding this entry.
    pub tier: Tier,
    /// What produced the entry.
    pub source: EntrySource,
    /// Tool name, when the entry records tool traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Whether the entry records a failure.
    #[serde(default)]
    pub is_error: bool,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Cached token estimate of `content`.
    pub estimated_tokens: usize,
}

impl MemoryEntry {
    /// Create an entry, estimating tokens from the content.
    pub fn new(content: impl Into<String>, importance: f64, source: EntrySource) -> Self {
        let content = content.into();
        let estimated_tokens = crate::context::estimate_tokens(&content);
        Self {
            entry_id: EntryId::generate(),
            content,
            importance: importance.clamp(0.0, 1.0),
            tier: Tier::L1,
            source,
            tool_name: None,
            is_error: source == EntrySource::Error,
            timestamp: Utc::now(),
            estimated_tokens,
        }
    }

    /// Attach the producing tool's name.
    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Mark the entry as a failure record.
    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }
}

/// Assigns an importance score to a new entry. Pluggable; the default is
/// a rule table keyed on [`EntrySource`].
pub trait ImportanceScorer: Send + Sync {
    /// Score in `[0, 1]`.
    fn score(&self, source: EntrySource, content: &str) -> f64;
}

/// Compresses L2 entries into L3 summaries.
///
/// Implementations must preserve (a) every failure record verbatim,
/// (b) at least one representative of each distinct tool name seen, and
/// (c) the most recent item by timestamp; the combined token estimate of
/// the output must not exceed `target_tokens`. Everything else may be
/// summarized away.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Produce summaries within the token target.
    async fn compress(
        &self,
        items: &[MemoryEntry],
        target_tokens: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;
}

/// A semantic-recall hit from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHit {
    /// The entry that matched.
    pub entry_id: EntryId,
    /// Similarity in `[0, 1]`, higher is closer.
    pub score: f64,
}

/// The L4 backend — an external vector index the engine only consumes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store (or re-store) an entry's text.
    async fn upsert(&self, entry_id: &EntryId, text: &str) -> Result<(), MemoryError>;

    /// Semantic lookup.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<IndexHit>, MemoryError>;

    /// Remove an entry; called when it is evicted from every tier.
    async fn remove(&self, entry_id: &EntryId) -> Result<(), MemoryError>;
}
