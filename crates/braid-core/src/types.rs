use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Ordered trace of prior results visible to a step.
///
/// A `Context` is an immutable value: `append` and `replace_last` return a new
/// context and leave the receiver untouched, so a branch can never see entries
/// added by a sibling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    entries: Arc<Vec<String>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with a single entry.
    pub fn seeded(entry: impl Into<String>) -> Self {
        Self {
            entries: Arc::new(vec![entry.into()]),
        }
    }

    /// Return a copy with `entry` appended.
    pub fn append(&self, entry: impl Into<String>) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push(entry.into());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Return a copy with the rendered output appended, or an unchanged copy
    /// when the output renders to nothing (`null` or an empty string).
    pub fn append_output(&self, output: &serde_json::Value) -> Self {
        match render_output(output) {
            Some(entry) => self.append(entry),
            None => self.clone(),
        }
    }

    /// Return a copy whose last entry is replaced by `entry`.
    /// An empty context becomes `[entry]`.
    pub fn replace_last(&self, entry: impl Into<String>) -> Self {
        let mut entries: Vec<String> = self.entries.as_ref().clone();
        entries.pop();
        entries.push(entry.into());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(|s| s.as_str())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON rendering used when embedding the context in a prompt.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self.entries.as_ref()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl From<Vec<String>> for Context {
    fn from(entries: Vec<String>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl<'a> From<Vec<&'a str>> for Context {
    fn from(entries: Vec<&'a str>) -> Self {
        entries
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into()
    }
}

impl Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(Context::from)
    }
}

/// Render a step output as a context entry.
///
/// Strings are used verbatim, `null` and `""` render to nothing, anything
/// else is compact JSON.
pub fn render_output(output: &serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A prompt sent to the completion service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
}

impl Prompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Messages for a prompt: optional system message followed by the user turn.
    pub fn from_prompt(prompt: &Prompt) -> Vec<Self> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(Self::system(system.clone()));
        }
        messages.push(Self::user(prompt.prompt.clone()));
        messages
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}
