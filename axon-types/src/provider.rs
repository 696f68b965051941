//! The LLM provider capability trait and its streaming surface.

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// JSON Schema description of a tool, as handed to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// A chat request. The engine never sees vendor-specific fields; adapters
/// translate this into whatever their API wants.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation messages, system material included.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolSchema>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
}

/// One item of a streamed model response.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// Incremental text content.
    TextDelta(String),
    /// A complete structured tool-call request.
    ToolCall(ToolCall),
    /// The response is complete.
    Done,
}

/// The stream of response items. Consume with `StreamExt::next()`.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamItem, ProviderError>> + Send>>;

/// LLM provider interface.
///
/// Implementations adapt OpenAI, Anthropic, or other APIs. The trait is
/// object-safe — the engine holds an `Arc<dyn LlmProvider>` so providers
/// can be swapped at construction time.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a streamed chat completion.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ToolCallId;
    use futures::StreamExt;
    use serde_json::json;

    struct ScriptedProvider;

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatStream, ProviderError> {
            let items = vec![
                Ok(StreamItem::TextDelta("hel".into())),
                Ok(StreamItem::TextDelta("lo".into())),
                Ok(StreamItem::ToolCall(ToolCall {
                    id: ToolCallId::new("tc_1"),
                    name: "search".into(),
                    arguments: json!({"q": "foo"}),
                })),
                Ok(StreamItem::Done),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn scripted_stream_yields_in_order() {
        let provider: std::sync::Arc<dyn LlmProvider> = std::sync::Arc::new(ScriptedProvider);
        let mut stream = provider
            .stream_chat(ChatRequest {
                messages: vec![],
                tools: vec![],
                temperature: None,
                max_tokens: None,
            })
            .await
            .unwrap();

        let mut text = String::new();
        let mut calls = 0;
        while let Some(item) = stream.next().await {
            match item.unwrap() {
                StreamItem::TextDelta(delta) => text.push_str(&delta),
                StreamItem::ToolCall(_) => calls += 1,
                StreamItem::Done => break,
            }
        }
        assert_eq!(text, "hello");
        assert_eq!(calls, 1);
    }
}
