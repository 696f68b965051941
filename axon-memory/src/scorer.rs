//! Rule-based importance scoring.

use axon_types::{EntrySource, ImportanceScorer};

/// The default importance table, keyed on what produced the entry.
///
/// Failures score highest so compression never drops them; planning notes
/// and tool results follow; everything else sits in the middle of the
/// scale. A content scan bumps entries whose text reports a failure even
/// when the producing action did not classify itself as one.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedScorer;

impl ImportanceScorer for RuleBasedScorer {
    fn score(&self, source: EntrySource, content: &str) -> f64 {
        let base: f64 = match source {
            EntrySource::Error => 0.9,
            EntrySource::Planning => 0.8,
            EntrySource::ToolResult => 0.75,
            EntrySource::Summary => 0.7,
            EntrySource::UserTurn => 0.65,
            EntrySource::AssistantOutput => 0.6,
            _ => 0.4,
        };
        let lower = content.to_lowercase();
        if source != EntrySource::Error
            && (lower.contains("error") || lower.contains("failed") || lower.contains("exception"))
        {
            return base.max(0.85);
        }
        base
    }
}
