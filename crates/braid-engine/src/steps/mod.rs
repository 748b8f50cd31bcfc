//! Built-in composite steps plus the agent and closure terminal steps.

pub mod agent;
pub mod best_of_all;
pub mod evaluator;
pub mod for_each;
pub mod func;
pub mod one_of;
pub mod parallel;
pub mod sequence;

pub use agent::AgentStep;
pub use func::FnStep;

use braid_core::error::{BraidError, Result};
use braid_core::flow::{FlowDefinition, FlowInput};

// Built-in step kinds
pub const SEQUENCE: &str = "sequence";
pub const PARALLEL: &str = "parallel";
pub const ONE_OF: &str = "one_of";
pub const EVALUATOR: &str = "evaluator";
pub const FOR_EACH: &str = "for_each";
pub const BEST_OF_ALL: &str = "best_of_all";

// Step-specific field names
pub const CONDITIONS: &str = "conditions";
pub const CRITERIA: &str = "criteria";
pub const MAX_ITERATIONS: &str = "maxIterations";
pub const ITEM_DESCRIPTOR: &str = "itemDescriptor";

fn shape_error(definition: &FlowDefinition, expected: &str) -> BraidError {
    BraidError::invalid_flow(
        definition.label(),
        format!("expected {} as input, got {}", expected, definition.input.shape()),
    )
}

pub(crate) fn expect_instruction(definition: &FlowDefinition) -> Result<()> {
    match definition.input {
        FlowInput::Instruction(_) => Ok(()),
        _ => Err(shape_error(definition, "an instruction")),
    }
}

pub(crate) fn expect_single(definition: &FlowDefinition) -> Result<()> {
    match definition.input {
        FlowInput::Single(_) => Ok(()),
        _ => Err(shape_error(definition, "a single flow")),
    }
}

/// Require a list of children and return its length.
pub(crate) fn expect_many(definition: &FlowDefinition) -> Result<usize> {
    match &definition.input {
        FlowInput::Many(children) => Ok(children.len()),
        _ => Err(shape_error(definition, "a list of flows")),
    }
}

pub(crate) fn expect_str_field(definition: &FlowDefinition, key: &str) -> Result<()> {
    match definition.fields.str(key) {
        Some(_) => Ok(()),
        None => Err(BraidError::invalid_flow(
            definition.label(),
            format!("missing string field `{}`", key),
        )),
    }
}
