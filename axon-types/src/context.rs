//! Context components and assembly metadata.

use serde::{Deserialize, Serialize};

/// Recommended priority bands for context components.
pub mod priority {
    /// Never truncated, never excluded; overflow here fails assembly.
    pub const CRITICAL: i32 = 100;
    /// Included before everything below.
    pub const HIGH: i32 = 90;
    /// Default band.
    pub const MEDIUM: i32 = 70;
    /// Included when room remains.
    pub const LOW: i32 = 50;
    /// First to be dropped.
    pub const OPTIONAL: i32 = 30;
}

/// Estimate the token count of a text with the standard 4 chars/token
/// heuristic. Real tokenization varies per model; this approximates the
/// major model families closely enough for budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// A named, prioritized chunk of text destined for the model's context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextComponent {
    /// Stable identifier (e.g. `system_instructions`, `rag_docs`).
    pub name: String,
    /// The text.
    pub content: String,
    /// Selection priority; see [`priority`] for the recommended bands.
    pub priority: i32,
    /// Whether the assembler may shorten this component when over budget.
    pub truncatable: bool,
    /// Cached token estimate.
    pub estimated_tokens: usize,
}

impl ContextComponent {
    /// Create a component, estimating its token count from the content.
    pub fn new(name: impl Into<String>, content: impl Into<String>, priority: i32) -> Self {
        let content = content.into();
        let estimated_tokens = estimate_tokens(&content);
        Self {
            name: name.into(),
            content,
            priority,
            truncatable: priority < self::priority::CRITICAL,
            estimated_tokens,
        }
    }

    /// Mark the component non-truncatable.
    pub fn fixed(mut self) -> Self {
        self.truncatable = false;
        self
    }
}

/// What the assembler decided about one component. The stream of these
/// records is the context debugger's raw data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDecision {
    /// Which component.
    pub name: String,
    /// Whether any of it made it into the assembled context.
    pub included: bool,
    /// Whether it was shortened to fit.
    pub truncated: bool,
    /// Why it was truncated or excluded (empty when included whole).
    pub reason: String,
    /// Tokens the component occupies in the final context.
    pub final_tokens: usize,
}

/// Token accounting for one assembled context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Tokens in the assembled text.
    pub total_tokens: usize,
    /// The configured budget.
    pub budget: usize,
    /// Per-component inclusion/truncation decisions, in evaluation order.
    pub decisions: Vec<ComponentDecision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn critical_components_default_to_fixed() {
        let critical = ContextComponent::new("rules", "always", priority::CRITICAL);
        assert!(!critical.truncatable);
        let optional = ContextComponent::new("rag", "maybe", priority::OPTIONAL);
        assert!(optional.truncatable);
    }

    #[test]
    fn metadata_roundtrip() {
        let meta = ContextMetadata {
            total_tokens: 120,
            budget: 200,
            decisions: vec![ComponentDecision {
                name: "rag_docs".into(),
                included: true,
                truncated: true,
                reason: "over budget".into(),
                final_tokens: 40,
            }],
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ContextMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
