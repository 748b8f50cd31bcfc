use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use braid_core::error::{BraidError, Result};
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::judge;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

use super::CRITERIA;

/// Runs all candidates concurrently, then asks a judge which result best
/// satisfies `criteria` and returns that result.
pub struct BestOfAllStep;

impl StepHandler for BestOfAllStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let criteria = node.require_str(CRITERIA)?;
            let jobs = node
                .children()
                .iter()
                .map(|child| (child.clone(), context.clone()))
                .collect();
            let mut results = runtime.run_concurrent(jobs).await?;

            let index =
                judge::select_best(runtime.completion(), node.label(), &results, criteria).await?;

            let candidates = results.len();
            match usize::try_from(index) {
                Ok(i) if i < candidates => Ok(results.swap_remove(i)),
                _ => {
                    warn!(step = node.label(), index, candidates, "Judge selected no candidate");
                    Err(BraidError::InvalidSelection { index, candidates })
                }
            }
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        if super::expect_many(definition)? == 0 {
            return Err(BraidError::invalid_flow(
                definition.label(),
                "needs at least one candidate",
            ));
        }
        super::expect_str_field(definition, CRITERIA)
    }
}
