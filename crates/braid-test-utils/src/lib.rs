//! Mocks and fixtures shared by Braid tests.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::{BraidError, Result};
use braid_core::traits::CompletionService;
use braid_core::types::Prompt;

/// Scripted `CompletionService`.
///
/// Text and structured replies are served from two FIFO queues. Every call is
/// recorded; a call with nothing left in its queue fails with `LlmRequest`.
#[derive(Default)]
pub struct MockCompletion {
    texts: Mutex<VecDeque<Result<String>>>,
    structured: Mutex<VecDeque<Result<Value>>>,
    text_calls: Mutex<Vec<Prompt>>,
    structured_calls: Mutex<Vec<(Prompt, Value)>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `generate_text` reply.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.texts.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Queue a `generate_structured` reply.
    pub fn with_structured(self, value: Value) -> Self {
        self.structured.lock().unwrap().push_back(Ok(value));
        self
    }

    /// Queue a `generate_text` failure.
    pub fn with_text_error(self, error: BraidError) -> Self {
        self.texts.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue a `generate_structured` failure.
    pub fn with_structured_error(self, error: BraidError) -> Self {
        self.structured.lock().unwrap().push_back(Err(error));
        self
    }

    /// Prompts received by `generate_text`, in call order.
    pub fn text_calls(&self) -> Vec<Prompt> {
        self.text_calls.lock().unwrap().clone()
    }

    /// Prompts and schemas received by `generate_structured`, in call order.
    pub fn structured_calls(&self) -> Vec<(Prompt, Value)> {
        self.structured_calls.lock().unwrap().clone()
    }

    /// Replies still queued, text and structured.
    pub fn remaining(&self) -> (usize, usize) {
        (
            self.texts.lock().unwrap().len(),
            self.structured.lock().unwrap().len(),
        )
    }
}

impl CompletionService for MockCompletion {
    fn generate_text(&self, prompt: Prompt) -> BoxFuture<'_, Result<String>> {
        self.text_calls.lock().unwrap().push(prompt);
        let reply = self.texts.lock().unwrap().pop_front();
        Box::pin(async move {
            reply.unwrap_or_else(|| {
                Err(BraidError::LlmRequest(
                    "MockCompletion: no text reply queued".into(),
                ))
            })
        })
    }

    fn generate_structured(&self, prompt: Prompt, schema: Value) -> BoxFuture<'_, Result<Value>> {
        self.structured_calls.lock().unwrap().push((prompt, schema));
        let reply = self.structured.lock().unwrap().pop_front();
        Box::pin(async move {
            reply.unwrap_or_else(|| {
                Err(BraidError::LlmRequest(
                    "MockCompletion: no structured reply queued".into(),
                ))
            })
        })
    }
}

/// Minimal config TOML pointing at a local endpoint.
pub fn test_config_toml() -> &'static str {
    r#"
[model]
provider = "ollama"
model_id = "llama3"
base_url = "http://localhost:11434/v1/chat/completions"

[engine]
default_max_iterations = 2

[steps.writer]
system = "You write short answers."
"#
}

/// Write `content` to a temporary file with the given extension.
pub fn temp_file(content: &str, extension: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{}", extension))
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}
