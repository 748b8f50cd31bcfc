use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::{BraidError, Result};
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

/// Terminal step backed by an async closure taking the node's instruction
/// and the current context.
pub struct FnStep<F> {
    func: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(String, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> StepHandler for FnStep<F>
where
    F: Fn(String, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        _runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        let Some(instruction) = node.instruction() else {
            let err = BraidError::invalid_flow(node.label(), "closure steps take an instruction");
            return Box::pin(async move { Err(err) });
        };
        Box::pin((self.func)(instruction.to_string(), context))
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_instruction(definition)
    }
}
