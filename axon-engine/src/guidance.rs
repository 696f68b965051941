//! Feedback guidance: lightweight analysis of tool results and the
//! handler chain that turns it into a steering message.

use axon_types::ToolResult;

const DATA_WORDS: &[&str] = &["data", "found", "retrieved", "table", "schema"];
const ERROR_WORDS: &[&str] = &["error", "failed", "exception", "not found"];
const COMPLETION_WORDS: &[&str] = &["complete", "finished", "done", "ready"];
const ANALYSIS_WORDS: &[&str] = &["analysis", "analyzed", "summary", "conclusion", "insight"];

/// What a keyword scan of the concatenated tool-result text said.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAnalysis {
    /// Data-bearing words appeared.
    pub has_data: bool,
    /// Failure words appeared, or a result was an error.
    pub has_errors: bool,
    /// Completion words appeared.
    pub suggests_completion: bool,
    /// Rough progress score in `[0, 1]`.
    pub completeness_score: f64,
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Analyze a batch's results.
pub fn analyze(results: &[ToolResult]) -> ResultAnalysis {
    let text = results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let has_data = contains_any(&text, DATA_WORDS);
    let has_errors = contains_any(&text, ERROR_WORDS) || results.iter().any(|r| r.is_error);
    let suggests_completion = contains_any(&text, COMPLETION_WORDS);

    let mut completeness_score: f64 = 0.0;
    if has_data {
        completeness_score += 0.3;
    }
    if contains_any(&text, ANALYSIS_WORDS) {
        completeness_score += 0.4;
    }
    if suggests_completion {
        completeness_score += 0.5;
    }

    ResultAnalysis {
        has_data,
        has_errors,
        suggests_completion,
        completeness_score: completeness_score.clamp(0.0, 1.0),
    }
}

/// A handler that can steer a class of tasks. The first handler whose
/// `can_handle` matches the original task supplies the guidance message
/// inserted into the next iteration's conversation (after the tool
/// messages — providers reject any other ordering).
pub trait TaskHandler: Send + Sync {
    /// Whether this handler knows how to steer the given task.
    fn can_handle(&self, original_task: &str) -> bool;

    /// Produce a guidance message, or `None` to stay silent.
    fn generate_guidance(
        &self,
        original_task: &str,
        analysis: &ResultAnalysis,
        depth: u32,
    ) -> Option<String>;
}

/// The fallback handler: matches every task and produces one of three
/// messages — finish, retry, or keep going.
pub struct DefaultTaskHandler;

impl TaskHandler for DefaultTaskHandler {
    fn can_handle(&self, _original_task: &str) -> bool {
        true
    }

    fn generate_guidance(
        &self,
        _original_task: &str,
        analysis: &ResultAnalysis,
        depth: u32,
    ) -> Option<String> {
        if analysis.suggests_completion || depth >= 6 {
            Some(
                "The gathered results look sufficient. Provide your final answer now; \
                 only call another tool if something essential is still missing."
                    .into(),
            )
        } else if analysis.has_errors {
            Some(
                "Some tool calls failed. Read the error messages, fix the arguments or \
                 choose a different tool, and retry."
                    .into(),
            )
        } else {
            Some("Continue the task using the information gathered so far.".into())
        }
    }
}

/// Run the chain: the first matching handler wins.
pub fn guidance_for(
    handlers: &[std::sync::Arc<dyn TaskHandler>],
    original_task: &str,
    analysis: &ResultAnalysis,
    depth: u32,
) -> Option<String> {
    handlers
        .iter()
        .find(|h| h.can_handle(original_task))
        .and_then(|h| h.generate_guidance(original_task, analysis, depth))
}
