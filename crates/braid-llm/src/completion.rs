use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use braid_core::config::ModelConfig;
use braid_core::error::{BraidError, Result};
use braid_core::traits::{CompletionService, LlmClient};
use braid_core::types::{ChatMessage, Prompt, StreamDelta};

/// `CompletionService` backed by a streaming chat model.
///
/// Structured generation asks the model for a bare JSON document matching
/// the schema and parses whatever JSON object it finds in the reply.
pub struct LlmCompletion {
    llm: Box<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmCompletion {
    pub fn new(llm: Box<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.config
    }

    async fn collect_text(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self.llm.chat_stream(&self.config, messages).await?;

        let mut response = String::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(text) => response.push_str(&text),
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => debug!(input_tokens, output_tokens, "Completion usage"),
                StreamDelta::Stop(reason) => debug!(?reason, "Completion stopped"),
            }
        }
        Ok(response)
    }
}

impl CompletionService for LlmCompletion {
    fn generate_text(&self, prompt: Prompt) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { self.collect_text(ChatMessage::from_prompt(&prompt)).await })
    }

    fn generate_structured(
        &self,
        prompt: Prompt,
        schema: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let prompt = structured_prompt(prompt, &schema);
            let response = self.collect_text(ChatMessage::from_prompt(&prompt)).await?;

            serde_json::from_str(extract_json(&response)).map_err(|e| {
                warn!(error = %e, response = %response, "Failed to parse structured response");
                BraidError::LlmParse(format!("expected JSON matching schema: {}", e))
            })
        })
    }
}

/// Append the JSON-only instruction and the schema to the system prompt.
fn structured_prompt(prompt: Prompt, schema: &serde_json::Value) -> Prompt {
    let instruction = format!(
        "Respond with ONLY a valid JSON document matching this JSON Schema:\n{}",
        schema
    );
    let system = match prompt.system {
        Some(system) => format!("{}\n\n{}", system.trim(), instruction),
        None => instruction,
    };
    Prompt {
        system: Some(system),
        prompt: prompt.prompt,
    }
}

/// Extract JSON from a response that may contain markdown code fences.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::BoxStream;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Streams a canned reply in two chunks and records the messages it saw.
    struct CannedClient {
        reply: String,
        seen: Arc<Mutex<Vec<ChatMessage>>>,
    }

    impl LlmClient for CannedClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            self.seen.lock().unwrap().extend(messages);
            let (a, b) = self.reply.split_at(self.reply.len() / 2);
            let items = vec![
                Ok(StreamDelta::TextDelta(a.to_string())),
                Ok(StreamDelta::TextDelta(b.to_string())),
                Ok(StreamDelta::Stop(braid_core::types::StopReason::EndTurn)),
            ];
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    fn completion(reply: &str) -> (LlmCompletion, Arc<Mutex<Vec<ChatMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = CannedClient {
            reply: reply.to_string(),
            seen: seen.clone(),
        };
        (LlmCompletion::new(Box::new(client), ModelConfig::new("m")), seen)
    }

    #[tokio::test]
    async fn test_generate_text_joins_deltas() {
        let (llm, seen) = completion("Hello, world");
        let text = llm
            .generate_text(Prompt::new("greet").with_system("be kind"))
            .await
            .unwrap();
        assert_eq!(text, "Hello, world");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_generate_structured_parses_fenced_json() {
        let (llm, seen) = completion("Sure!\n```json\n{\"index\": 1}\n```");
        let value = llm
            .generate_structured(Prompt::new("pick"), json!({"type": "object"}))
            .await
            .unwrap();
        assert_eq!(value, json!({"index": 1}));

        let messages = seen.lock().unwrap();
        assert!(messages[0].content.contains("JSON Schema"));
    }

    #[tokio::test]
    async fn test_generate_structured_rejects_prose() {
        let (llm, _) = completion("I cannot decide");
        let err = llm
            .generate_structured(Prompt::new("pick"), json!({"type": "object"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BraidError::LlmParse(_)));
    }

    /// Yields one text delta, then fails mid-stream.
    struct BrokenClient;

    impl LlmClient for BrokenClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            let items = vec![
                Ok(StreamDelta::TextDelta("partial".to_string())),
                Err(BraidError::LlmStream("connection reset".to_string())),
            ];
            Box::pin(async move {
                Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    #[tokio::test]
    async fn test_generate_text_fails_on_stream_error() {
        let llm = LlmCompletion::new(Box::new(BrokenClient), ModelConfig::new("m"));
        let err = llm.generate_text(Prompt::new("greet")).await.unwrap_err();
        assert!(matches!(err, BraidError::LlmStream(_)));
    }

    #[test]
    fn test_extract_json_plain_object() {
        assert_eq!(extract_json("  {\"pass\": true}  "), "{\"pass\": true}");
        assert_eq!(extract_json("Result: {\"a\": {\"b\": 1}} done"), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_structured_prompt_keeps_system() {
        let prompt = structured_prompt(Prompt::new("x").with_system("Judge."), &json!({}));
        let system = prompt.system.unwrap();
        assert!(system.starts_with("Judge."));
        assert!(system.contains("JSON Schema"));
    }
}
