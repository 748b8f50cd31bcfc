//! Flow definitions: the plain, serializable description of a workflow.
//!
//! A definition names the step kind that executes it, carries its input
//! (an instruction, one nested flow, or an ordered list of nested flows) and
//! any step-specific fields. Definitions are immutable value data; hydration
//! never modifies them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node of a flow tree before any handler is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// Registry key of the handler that runs this node.
    #[serde(alias = "agent", alias = "step")]
    pub step_kind: String,
    /// Label used only for observability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub input: FlowInput,
    /// Step-specific fields (`conditions`, `criteria`, `maxIterations`, `itemDescriptor`, ...).
    #[serde(flatten)]
    pub fields: StepFields,
}

/// Input of a flow node. The variant decides whether the node is a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowInput {
    /// Literal instruction for a terminal step.
    Instruction(String),
    /// Ordered children.
    Many(Vec<FlowDefinition>),
    /// Exactly one child.
    Single(Box<FlowDefinition>),
}

impl FlowInput {
    pub fn is_leaf(&self) -> bool {
        matches!(self, FlowInput::Instruction(_))
    }

    /// Short name of the variant, used in validation messages.
    pub fn shape(&self) -> &'static str {
        match self {
            FlowInput::Instruction(_) => "instruction",
            FlowInput::Single(_) => "single flow",
            FlowInput::Many(_) => "list of flows",
        }
    }
}

impl FlowDefinition {
    /// Leaf node running `step_kind` with a literal instruction.
    pub fn leaf(step_kind: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            step_kind: step_kind.into(),
            name: None,
            input: FlowInput::Instruction(instruction.into()),
            fields: StepFields::default(),
        }
    }

    /// Node wrapping a single nested flow.
    pub fn single(step_kind: impl Into<String>, child: FlowDefinition) -> Self {
        Self {
            step_kind: step_kind.into(),
            name: None,
            input: FlowInput::Single(Box::new(child)),
            fields: StepFields::default(),
        }
    }

    /// Node with an ordered list of nested flows.
    pub fn many(step_kind: impl Into<String>, children: Vec<FlowDefinition>) -> Self {
        Self {
            step_kind: step_kind.into(),
            name: None,
            input: FlowInput::Many(children),
            fields: StepFields::default(),
        }
    }

    /// Set the observability label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a step-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// Label for logs: the name when present, otherwise the step kind.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.step_kind)
    }

    /// Parse a definition from JSON text.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a definition from TOML text.
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        toml::from_str(text).map_err(|e| crate::BraidError::Config(e.to_string()))
    }
}

/// Step-specific fields of a node, kept as a JSON map with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepFields(Map<String, Value>);

impl StepFields {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A string field.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// A non-negative integer field.
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(|v| v.as_u64())
    }

    /// A list-of-strings field. `None` if absent or if any element is not a string.
    pub fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.0
            .get(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
