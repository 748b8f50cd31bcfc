//! Hydration: binding a flow definition to executable handlers.

use std::sync::Arc;

use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::flow::{FlowDefinition, FlowInput, StepFields};

use crate::registry::{StepHandler, StepRegistry};

/// A flow node with its handler resolved.
pub struct HydratedFlow {
    pub step_kind: String,
    pub name: Option<String>,
    pub input: HydratedInput,
    pub fields: StepFields,
    handler: Arc<dyn StepHandler>,
}

/// Input of a hydrated node; mirrors [`FlowInput`].
#[derive(Debug)]
pub enum HydratedInput {
    Instruction(String),
    Single(Arc<HydratedFlow>),
    Many(Vec<Arc<HydratedFlow>>),
}

impl HydratedFlow {
    pub fn handler(&self) -> &Arc<dyn StepHandler> {
        &self.handler
    }

    /// The name when present, otherwise the step kind.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.step_kind)
    }

    /// Literal instruction of a leaf node.
    pub fn instruction(&self) -> Option<&str> {
        match &self.input {
            HydratedInput::Instruction(text) => Some(text),
            _ => None,
        }
    }

    /// Children in declaration order. A single child is a one-element slice,
    /// a leaf has none.
    pub fn children(&self) -> &[Arc<HydratedFlow>] {
        match &self.input {
            HydratedInput::Instruction(_) => &[],
            HydratedInput::Single(child) => std::slice::from_ref(child),
            HydratedInput::Many(children) => children,
        }
    }

    /// The only child of a `Single` node.
    pub fn child(&self) -> Result<&Arc<HydratedFlow>> {
        match &self.input {
            HydratedInput::Single(child) => Ok(child),
            _ => Err(BraidError::invalid_flow(
                self.label(),
                "expected a single nested flow as input",
            )),
        }
    }

    /// A required string field.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.fields.str(key).ok_or_else(|| {
            BraidError::invalid_flow(self.label(), format!("missing string field `{}`", key))
        })
    }

    /// Rebuild the plain definition this node was hydrated from.
    pub fn to_definition(&self) -> FlowDefinition {
        let input = match &self.input {
            HydratedInput::Instruction(text) => FlowInput::Instruction(text.clone()),
            HydratedInput::Single(child) => FlowInput::Single(Box::new(child.to_definition())),
            HydratedInput::Many(children) => {
                FlowInput::Many(children.iter().map(|c| c.to_definition()).collect())
            }
        };
        FlowDefinition {
            step_kind: self.step_kind.clone(),
            name: self.name.clone(),
            input,
            fields: self.fields.clone(),
        }
    }
}

impl std::fmt::Debug for HydratedFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydratedFlow")
            .field("step_kind", &self.step_kind)
            .field("name", &self.name)
            .field("input", &self.input)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Resolve every node of `definition` against `registry`.
///
/// Fails with `UnknownStep` for the first unregistered step kind (parents
/// before children, children in declaration order) and with `InvalidFlow`
/// when a handler rejects the shape of its node. No handler runs.
pub fn hydrate(definition: &FlowDefinition, registry: &StepRegistry) -> Result<Arc<HydratedFlow>> {
    let handler = registry
        .get(&definition.step_kind)
        .ok_or_else(|| BraidError::UnknownStep(definition.step_kind.clone()))?;

    handler.validate(definition)?;

    let input = match &definition.input {
        FlowInput::Instruction(text) => HydratedInput::Instruction(text.clone()),
        FlowInput::Single(child) => HydratedInput::Single(hydrate(child, registry)?),
        FlowInput::Many(children) => HydratedInput::Many(
            children
                .iter()
                .map(|child| hydrate(child, registry))
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    debug!(step = definition.label(), kind = %definition.step_kind, "Hydrated step");

    Ok(Arc::new(HydratedFlow {
        step_kind: definition.step_kind.clone(),
        name: definition.name.clone(),
        input,
        fields: definition.fields.clone(),
        handler,
    }))
}
