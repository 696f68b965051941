//! The default extractive compressor.

use async_trait::async_trait;
use axon_types::{Compressor, EntrySource, MemoryEntry, MemoryError, estimate_tokens};
use std::collections::HashSet;

/// Compresses a working set into summaries without calling a model.
///
/// Keeps what the contract requires — every failure record verbatim, one
/// representative per distinct tool name, and the most recent item — then
/// folds everything else into a single digest line. Representative and
/// digest text is clipped to fit the token target; the required records
/// are never dropped, so a target too small to hold the failure records
/// alone is an error.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveCompressor {
    /// Character cap applied to representative snippets.
    pub snippet_chars: usize,
}

impl Default for ExtractiveCompressor {
    fn default() -> Self {
        Self { snippet_chars: 240 }
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

fn summary_of(entry: &MemoryEntry, snippet_chars: usize) -> MemoryEntry {
    let mut summary = MemoryEntry::new(
        clip(&entry.content, snippet_chars),
        entry.importance,
        EntrySource::Summary,
    )
    .with_error(entry.is_error);
    summary.tool_name = entry.tool_name.clone();
    summary
}

#[async_trait]
impl Compressor for ExtractiveCompressor {
    async fn compress(
        &self,
        items: &[MemoryEntry],
        target_tokens: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let mut kept: Vec<MemoryEntry> = Vec::new();
        let mut kept_ids: HashSet<&axon_types::EntryId> = HashSet::new();

        // (a) Failure records, verbatim.
        for entry in items.iter().filter(|e| e.is_error) {
            let mut verbatim =
                MemoryEntry::new(entry.content.clone(), entry.importance, EntrySource::Summary)
                    .with_error(true);
            verbatim.tool_name = entry.tool_name.clone();
            kept.push(verbatim);
            kept_ids.insert(&entry.entry_id);
        }

        // (b) One representative per distinct tool name — the most recent.
        let mut tools_seen: HashSet<&str> = items
            .iter()
            .filter(|e| kept_ids.contains(&e.entry_id))
            .filter_map(|e| e.tool_name.as_deref())
            .collect();
        let mut by_recency: Vec<&MemoryEntry> = items.iter().collect();
        by_recency.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        for entry in &by_recency {
            if let Some(tool) = entry.tool_name.as_deref() {
                if tools_seen.insert(tool) {
                    kept.push(summary_of(entry, self.snippet_chars));
                    kept_ids.insert(&entry.entry_id);
                }
            }
        }

        // (c) The most recent item overall.
        if let Some(newest) = by_recency.first() {
            if !kept_ids.contains(&newest.entry_id) {
                kept.push(summary_of(newest, self.snippet_chars));
                kept_ids.insert(&newest.entry_id);
            }
        }

        // Fold the remainder into one digest line. The digest is the only
        // entry the budget pass may drop outright.
        let mut droppable: Vec<bool> = vec![false; kept.len()];
        let leftovers: Vec<&MemoryEntry> = items
            .iter()
            .filter(|e| !kept_ids.contains(&e.entry_id))
            .collect();
        if !leftovers.is_empty() {
            let joined = leftovers
                .iter()
                .map(|e| clip(&e.content, 60))
                .collect::<Vec<_>>()
                .join("; ");
            let digest = format!("{} earlier items: {}", leftovers.len(), joined);
            kept.push(MemoryEntry::new(
                clip(&digest, self.snippet_chars),
                0.5,
                EntrySource::Summary,
            ));
            droppable.push(true);
        }

        // Enforce the token target. Failure records are untouchable, so a
        // target they alone exceed is unsatisfiable.
        let required: usize = kept
            .iter()
            .filter(|e| e.is_error)
            .map(|e| e.estimated_tokens)
            .sum();
        if required > target_tokens {
            return Err(MemoryError::Compression(format!(
                "failure records alone need {required} tokens, target is {target_tokens}"
            )));
        }
        let mut total: usize = kept.iter().map(|e| e.estimated_tokens).sum();
        while total > target_tokens {
            let over = total - target_tokens;
            let Some(idx) = kept
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.is_error && e.estimated_tokens > 1)
                .max_by_key(|(_, e)| e.estimated_tokens)
                .map(|(i, _)| i)
            else {
                break;
            };
            let estimated = kept[idx].estimated_tokens;
            if droppable[idx] && estimated <= over {
                kept.remove(idx);
                droppable.remove(idx);
            } else {
                // Clip toward the target, but never below one token.
                let keep_tokens = estimated.saturating_sub(over).max(1);
                let entry = &mut kept[idx];
                let clipped = clip(&entry.content.clone(), keep_tokens.saturating_mul(4).saturating_sub(4));
                entry.content = clipped;
                entry.estimated_tokens = estimate_tokens(&entry.content);
            }
            let new_total: usize = kept.iter().map(|e| e.estimated_tokens).sum();
            if new_total >= total {
                break;
            }
            total = new_total;
        }

        Ok(kept)
    }
}
