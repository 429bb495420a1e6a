//! The provider-agnostic chat contract the engine calls through.
//!
//! Concrete LLM providers (OpenAI-compatible, Anthropic, ...) are
//! outside this crate entirely — the composition root hands the
//! engine an `Arc<dyn ChatClient>`, mirroring how the reference
//! gateway's `turn.rs` holds an `Arc<dyn sa_providers::LlmProvider>`
//! resolved elsewhere and only calls `chat_stream` on it.

use foreman_domain::stream::{BoxStream, StreamEvent};
use foreman_domain::tool::{Message, ToolDefinition};

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, StreamEvent>, ChatError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// Drain a chat stream into its final text and tool calls, ignoring
/// incremental events. Used by compaction and summarization, which need
/// the completed response rather than a token-by-token feed.
pub async fn collect_stream_text(
    mut stream: BoxStream<'static, StreamEvent>,
) -> Result<String, ChatError> {
    use futures_util::StreamExt;

    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Token { text: chunk } => text.push_str(&chunk),
            StreamEvent::Error { message } => return Err(ChatError::Stream(message)),
            StreamEvent::Done { .. } => break,
            _ => {}
        }
    }
    Ok(text)
}
