//! Layered memory and context assembly for axon.
//!
//! Four tiers: a FIFO ring of raw recent traffic (L1), an
//! importance-ordered working set (L2), compressed summaries (L3), and an
//! external vector index (L4). A single [`EntryStore`] arena owns the
//! bytes; tiers hold ids, and an entry evicted from every tier is purged
//! from the store and the index. The [`ContextAssembler`] turns prioritized
//! components into a single context block under a hard token budget.

pub mod assembler;
pub mod compress;
pub mod layered;
pub mod scorer;
pub mod store;

pub use assembler::ContextAssembler;
pub use compress::ExtractiveCompressor;
pub use layered::{CompressionRecord, LayeredMemory, MemoryConfig, PromotionReport};
pub use scorer::RuleBasedScorer;
pub use store::EntryStore;
