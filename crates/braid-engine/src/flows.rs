//! Builders for flow definitions using the built-in step kinds.
//!
//! ```
//! use braid_engine::flows::{evaluator, sequence, step};
//!
//! let flow = sequence(vec![
//!     step("researcher", "Find trending Rust crates"),
//!     evaluator(step("writer", "Write a newsletter"), "Fits in one screen"),
//! ])
//! .named("newsletter");
//! assert_eq!(flow.step_kind, "sequence");
//! ```

use serde_json::Value;

use braid_core::flow::FlowDefinition;

use crate::steps::{
    BEST_OF_ALL, CONDITIONS, CRITERIA, EVALUATOR, FOR_EACH, ITEM_DESCRIPTOR, ONE_OF, PARALLEL,
    SEQUENCE,
};

/// Terminal step `step_kind` with a literal instruction.
pub fn step(step_kind: impl Into<String>, instruction: impl Into<String>) -> FlowDefinition {
    FlowDefinition::leaf(step_kind, instruction)
}

pub fn sequence(steps: Vec<FlowDefinition>) -> FlowDefinition {
    FlowDefinition::many(SEQUENCE, steps)
}

pub fn parallel(steps: Vec<FlowDefinition>) -> FlowDefinition {
    FlowDefinition::many(PARALLEL, steps)
}

/// Router over `(condition, flow)` branches.
pub fn one_of<S: Into<String>>(branches: Vec<(S, FlowDefinition)>) -> FlowDefinition {
    let (conditions, flows): (Vec<String>, Vec<FlowDefinition>) = branches
        .into_iter()
        .map(|(condition, flow)| (condition.into(), flow))
        .unzip();
    FlowDefinition::many(ONE_OF, flows).with_field(CONDITIONS, conditions)
}

/// Refine `input` until it meets `criteria`. Set `maxIterations` with
/// `.with_field(MAX_ITERATIONS, n)`; the engine default applies otherwise.
pub fn evaluator(input: FlowDefinition, criteria: impl Into<String>) -> FlowDefinition {
    FlowDefinition::single(EVALUATOR, input).with_field(CRITERIA, criteria.into())
}

/// Run `input` once per item. `item` is a description or a JSON schema.
pub fn for_each(input: FlowDefinition, item: impl Into<Value>) -> FlowDefinition {
    FlowDefinition::single(FOR_EACH, input).with_field(ITEM_DESCRIPTOR, item)
}

pub fn best_of_all(candidates: Vec<FlowDefinition>, criteria: impl Into<String>) -> FlowDefinition {
    FlowDefinition::many(BEST_OF_ALL, candidates).with_field(CRITERIA, criteria.into())
}
