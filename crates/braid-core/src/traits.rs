use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Produces free text or schema-conforming values from a prompt.
///
/// Built-in judge steps only ever call `generate_structured`; terminal agent
/// steps call `generate_text`.
pub trait CompletionService: Send + Sync + 'static {
    /// Generate free text from a prompt.
    fn generate_text(&self, prompt: Prompt) -> BoxFuture<'_, Result<String>>;

    /// Generate a JSON value conforming to `schema` (a JSON Schema object).
    fn generate_structured(
        &self,
        prompt: Prompt,
        schema: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Provider-specific streaming chat.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}
