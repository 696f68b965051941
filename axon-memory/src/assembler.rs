//! The priority-budget context assembler.

use axon_types::{
    ComponentDecision, ContextComponent, ContextError, ContextMetadata, estimate_tokens, priority,
};

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Builds one context block under a hard token budget.
///
/// Components are considered in priority-descending, insertion-preserving
/// order. When everything fits inside `budget × buffer_ratio` the build is
/// a plain concatenation; otherwise components are included greedily, with
/// truncatable ones prefix-clipped to the remaining room and the rest
/// recorded as excluded. Critical components are never clipped or dropped
/// — if they alone exceed the working budget, assembly fails.
pub struct ContextAssembler;

impl ContextAssembler {
    /// Assemble `components` into `(text, metadata)`.
    ///
    /// # Errors
    ///
    /// [`ContextError::Overflow`] when the critical components alone
    /// exceed the working budget.
    pub fn assemble(
        components: &[ContextComponent],
        max_tokens: usize,
        buffer_ratio: f64,
    ) -> Result<(String, ContextMetadata), ContextError> {
        let budget = ((max_tokens as f64) * buffer_ratio.clamp(0.0, 1.0)).floor() as usize;

        // Priority-descending, insertion-preserving order.
        let mut order: Vec<usize> = (0..components.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(components[i].priority));

        let critical_total: usize = components
            .iter()
            .filter(|c| c.priority >= priority::CRITICAL)
            .map(|c| c.estimated_tokens)
            .sum();
        if critical_total > budget {
            return Err(ContextError::Overflow {
                required: critical_total,
                budget,
            });
        }

        let total: usize = components.iter().map(|c| c.estimated_tokens).sum();
        let mut decisions = Vec::with_capacity(components.len());
        let mut parts: Vec<&str> = Vec::with_capacity(components.len());
        let mut clipped: Vec<(usize, String)> = Vec::new();

        if total <= budget {
            // Fast path: everything fits.
            for &i in &order {
                let component = &components[i];
                parts.push(&component.content);
                decisions.push(ComponentDecision {
                    name: component.name.clone(),
                    included: true,
                    truncated: false,
                    reason: String::new(),
                    final_tokens: component.estimated_tokens,
                });
            }
            let text = join_parts(&parts, &clipped);
            return Ok((
                text,
                ContextMetadata {
                    total_tokens: total,
                    budget,
                    decisions,
                },
            ));
        }

        // Greedy path.
        let mut used = 0usize;
        for &i in &order {
            let component = &components[i];
            let is_critical = component.priority >= priority::CRITICAL;
            let remaining = budget.saturating_sub(used);

            if is_critical || component.estimated_tokens <= remaining {
                used += component.estimated_tokens;
                parts.push(&component.content);
                decisions.push(ComponentDecision {
                    name: component.name.clone(),
                    included: true,
                    truncated: false,
                    reason: String::new(),
                    final_tokens: component.estimated_tokens,
                });
                continue;
            }

            let marker_tokens = estimate_tokens(TRUNCATION_MARKER);
            if component.truncatable && remaining > marker_tokens {
                let keep_chars = (remaining - marker_tokens).saturating_mul(4);
                let prefix = clip_at_boundary(&component.content, keep_chars);
                if prefix.is_empty() {
                    decisions.push(excluded(component, "no room left"));
                    continue;
                }
                let text = format!("{prefix}{TRUNCATION_MARKER}");
                let final_tokens = estimate_tokens(&text);
                used += final_tokens;
                tracing::debug!(component = %component.name, final_tokens, "truncated to fit budget");
                decisions.push(ComponentDecision {
                    name: component.name.clone(),
                    included: true,
                    truncated: true,
                    reason: "over budget".into(),
                    final_tokens,
                });
                clipped.push((parts.len(), text));
            } else {
                let reason = if component.truncatable {
                    "no room left"
                } else {
                    "over budget, not truncatable"
                };
                decisions.push(excluded(component, reason));
            }
        }

        let text = join_parts(&parts, &clipped);
        Ok((
            text,
            ContextMetadata {
                total_tokens: used,
                budget,
                decisions,
            },
        ))
    }
}

fn excluded(component: &ContextComponent, reason: &str) -> ComponentDecision {
    ComponentDecision {
        name: component.name.clone(),
        included: false,
        truncated: false,
        reason: reason.into(),
        final_tokens: 0,
    }
}

/// Clip to at most `max_chars` bytes on a char boundary.
fn clip_at_boundary(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Merge borrowed parts with clipped replacements, preserving order.
fn join_parts(parts: &[&str], clipped: &[(usize, String)]) -> String {
    let mut pieces: Vec<&str> = Vec::with_capacity(parts.len() + clipped.len());
    let mut clipped_iter = clipped.iter().peekable();
    for (i, part) in parts.iter().enumerate() {
        while let Some((at, text)) = clipped_iter.peek() {
            if *at == i {
                pieces.push(text.as_str());
                clipped_iter.next();
            } else {
                break;
            }
        }
        pieces.push(part);
    }
    for (_, text) in clipped_iter {
        pieces.push(text.as_str());
    }
    pieces.join("\n\n")
}
