//! The four-tier layered memory.

use crate::store::EntryStore;
use axon_types::{
    Compressor, EntryId, EntrySource, ImportanceScorer, MemoryEntry, MemoryError, Tier,
    VectorIndex,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Capacity and promotion policy for the tiers.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// L1 FIFO ring capacity.
    pub l1_capacity: usize,
    /// L2 working-set capacity; overflow is compressed into L3.
    pub l2_capacity: usize,
    /// Importance threshold for promotion into L2.
    pub l2_promotion_threshold: f64,
    /// L3 summary ring capacity.
    pub l3_capacity: usize,
    /// Token target handed to the compressor per compression step.
    pub l3_target_tokens: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 50,
            l2_capacity: 100,
            l2_promotion_threshold: 0.6,
            l3_capacity: 50,
            l3_target_tokens: 512,
        }
    }
}

impl From<&axon_types::EngineConfig> for MemoryConfig {
    fn from(config: &axon_types::EngineConfig) -> Self {
        Self {
            l1_capacity: config.l1_capacity,
            l2_capacity: config.l2_capacity,
            l2_promotion_threshold: config.l2_promotion_threshold,
            ..Self::default()
        }
    }
}

/// One compression step: what went in, the target, and what came out.
/// Journaled so the step can be re-run later with a different compressor.
#[derive(Debug, Clone)]
pub struct CompressionRecord {
    /// The L2 entries that were compressed (and released).
    pub inputs: Vec<MemoryEntry>,
    /// The token target the compressor was given.
    pub target_tokens: usize,
    /// The produced L3 summaries.
    pub summaries: Vec<MemoryEntry>,
}

/// What one promotion pass did.
#[derive(Debug, Default)]
pub struct PromotionReport {
    /// Entries moved from L1 into L2.
    pub promoted_to_l2: usize,
    /// Compression steps performed.
    pub compressions: Vec<CompressionRecord>,
    /// Summaries embedded into the vector index (async promotion only).
    pub embedded: usize,
    /// Entries purged from the store (evicted from every tier).
    pub purged: Vec<EntryId>,
}

/// Four-tier memory owned by one agent instance.
///
/// L1 is a bounded FIFO of raw traffic. [`promote`](LayeredMemory::promote)
/// moves important L1 entries into L2 and compresses L2 overflow into L3
/// summaries; [`promote_async`](LayeredMemory::promote_async) additionally
/// embeds new summaries into the vector index (L4). Promotion is
/// idempotent: entries carry a tier marker and a pass over an unchanged
/// memory does nothing.
pub struct LayeredMemory {
    config: MemoryConfig,
    store: EntryStore,
    scorer: Arc<dyn ImportanceScorer>,
    compressor: Arc<dyn Compressor>,
    index: Option<Arc<dyn VectorIndex>>,
    l1: VecDeque<EntryId>,
    l2: Vec<EntryId>,
    l3: VecDeque<EntryId>,
    embedded: HashSet<EntryId>,
}

impl LayeredMemory {
    /// Create a layered memory with the given policy and capabilities.
    /// `index` is the optional L4 backend.
    pub fn new(
        config: MemoryConfig,
        scorer: Arc<dyn ImportanceScorer>,
        compressor: Arc<dyn Compressor>,
        index: Option<Arc<dyn VectorIndex>>,
    ) -> Self {
        Self {
            config,
            store: EntryStore::new(),
            scorer,
            compressor,
            index,
            l1: VecDeque::new(),
            l2: Vec::new(),
            l3: VecDeque::new(),
            embedded: HashSet::new(),
        }
    }

    /// Record a new item into L1, scoring its importance. Returns the
    /// entry id. The oldest L1 entry is evicted (and purged, unless a
    /// higher tier took it) when the ring is full.
    pub fn record(
        &mut self,
        source: EntrySource,
        content: impl Into<String>,
        tool_name: Option<&str>,
        is_error: bool,
    ) -> EntryId {
        let content = content.into();
        let importance = self.scorer.score(source, &content);
        let mut entry = MemoryEntry::new(content, importance, source).with_error(is_error);
        if let Some(tool) = tool_name {
            entry = entry.with_tool_name(tool);
        }
        let id = self.store.insert(entry);
        self.l1.push_back(id.clone());

        while self.l1.len() > self.config.l1_capacity {
            if let Some(evicted) = self.l1.pop_front() {
                self.store.release(&evicted);
            }
        }
        id
    }

    /// Synchronous promotion: L1 → L2 by importance, L2 overflow → L3 by
    /// compression. Does not touch the vector index beyond purging
    /// evictions.
    pub async fn promote(&mut self) -> Result<PromotionReport, MemoryError> {
        let mut report = PromotionReport::default();

        // L1 → L2. Move, don't copy: the entry's single reference follows it.
        let eligible: Vec<EntryId> = self
            .l1
            .iter()
            .filter(|id| {
                self.store
                    .get(id)
                    .map(|e| e.tier == Tier::L1 && e.importance >= self.config.l2_promotion_threshold)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for id in eligible {
            self.l1.retain(|other| *other != id);
            self.store.set_tier(&id, Tier::L2);
            self.l2.push(id);
            report.promoted_to_l2 += 1;
        }
        let store = &self.store;
        self.l2.sort_by(|a, b| {
            let ia = store.get(a).map(|e| e.importance).unwrap_or(0.0);
            let ib = store.get(b).map(|e| e.importance).unwrap_or(0.0);
            ib.partial_cmp(&ia).unwrap_or(std::cmp::Ordering::Equal)
        });

        // L2 overflow → L3. The lowest-importance excess is compressed into
        // summaries instead of being dropped on the floor.
        if self.l2.len() > self.config.l2_capacity {
            let excess = self.l2.split_off(self.config.l2_capacity);
            let inputs: Vec<MemoryEntry> = excess
                .iter()
                .filter_map(|id| self.store.get(id).cloned())
                .collect();
            let summaries = self
                .compressor
                .compress(&inputs, self.config.l3_target_tokens)
                .await?;
            tracing::debug!(
                inputs = inputs.len(),
                summaries = summaries.len(),
                "compressed L2 overflow into L3"
            );
            for id in &excess {
                if self.store.release(id) {
                    report.purged.push(id.clone());
                }
            }

            for summary in &summaries {
                let mut summary = summary.clone();
                summary.tier = Tier::L3;
                let id = self.store.insert(summary);
                self.l3.push_back(id);
            }
            report.compressions.push(CompressionRecord {
                inputs,
                target_tokens: self.config.l3_target_tokens,
                summaries,
            });

            while self.l3.len() > self.config.l3_capacity {
                if let Some(evicted) = self.l3.pop_front() {
                    if self.store.release(&evicted) {
                        report.purged.push(evicted.clone());
                        // Evicted from every tier: the index entry must go
                        // too, or it grows without bound.
                        if self.embedded.remove(&evicted) {
                            if let Some(index) = &self.index {
                                index.remove(&evicted).await?;
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// The authoritative promotion path: [`promote`](Self::promote) plus
    /// embedding of new L3 summaries into the vector index.
    pub async fn promote_async(&mut self) -> Result<PromotionReport, MemoryError> {
        let mut report = self.promote().await?;
        let Some(index) = self.index.clone() else {
            return Ok(report);
        };

        let pending: Vec<EntryId> = self
            .l3
            .iter()
            .filter(|id| !self.embedded.contains(*id))
            .cloned()
            .collect();
        for id in pending {
            let Some(content) = self.store.get(&id).map(|e| e.content.clone()) else {
                continue;
            };
            index.upsert(&id, &content).await?;
            self.store.set_tier(&id, Tier::L4);
            self.embedded.insert(id);
            report.embedded += 1;
        }
        Ok(report)
    }

    /// Recall entries related to `query`: semantic via L4 when an index is
    /// attached, otherwise a substring scan over the working set and
    /// summaries.
    pub async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        if let Some(index) = &self.index {
            let hits = index.query(query, limit).await?;
            return Ok(hits
                .iter()
                .filter_map(|hit| self.store.get(&hit.entry_id).cloned())
                .collect());
        }

        let needle = query.to_lowercase();
        let mut found = Vec::new();
        for id in self.l2.iter().chain(self.l3.iter()) {
            if let Some(entry) = self.store.get(id) {
                if entry.content.to_lowercase().contains(&needle) {
                    found.push(entry.clone());
                    if found.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(found)
    }

    /// Whether a recall could find anything: an index is attached or the
    /// working set / summaries are non-empty.
    pub fn has_recallable(&self) -> bool {
        self.index.is_some() || !self.l2.is_empty() || !self.l3.is_empty()
    }

    /// The newest `n` raw L1 entries, oldest first.
    pub fn recent_window(&self, n: usize) -> Vec<&MemoryEntry> {
        let skip = self.l1.len().saturating_sub(n);
        self.l1
            .iter()
            .skip(skip)
            .filter_map(|id| self.store.get(id))
            .collect()
    }

    /// All current L3 summaries, oldest first.
    pub fn summaries(&self) -> Vec<&MemoryEntry> {
        self.l3.iter().filter_map(|id| self.store.get(id)).collect()
    }

    /// Tier occupancy `(l1, l2, l3, embedded)`.
    pub fn tier_sizes(&self) -> (usize, usize, usize, usize) {
        (
            self.l1.len(),
            self.l2.len(),
            self.l3.len(),
            self.embedded.len(),
        )
    }

    /// Live entries in the arena.
    pub fn store_len(&self) -> usize {
        self.store.len()
    }
}
