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

use super::CONDITIONS;

/// Routes to the one branch whose condition holds for the current context.
///
/// `conditions[i]` guards child `i`. Only the selected branch runs; it gets
/// the unmodified context.
pub struct OneOfStep;

impl StepHandler for OneOfStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let conditions = node.fields.strings(CONDITIONS).ok_or_else(|| {
                BraidError::invalid_flow(node.label(), "missing list field `conditions`")
            })?;
            let branches = node.children();

            let index =
                judge::select_branch(runtime.completion(), node.label(), &context, &conditions)
                    .await?;

            let branch = usize::try_from(index)
                .ok()
                .and_then(|i| branches.get(i))
                .ok_or_else(|| {
                    warn!(step = node.label(), index, "No branch satisfied");
                    BraidError::NoBranchSatisfied {
                        index,
                        branches: branches.len(),
                    }
                })?;

            runtime.run(branch, context).await
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        let branches = super::expect_many(definition)?;
        let conditions = definition.fields.strings(CONDITIONS).ok_or_else(|| {
            BraidError::invalid_flow(definition.label(), "`conditions` must be a list of strings")
        })?;
        if conditions.len() != branches {
            return Err(BraidError::invalid_flow(
                definition.label(),
                format!(
                    "{} conditions for {} branches",
                    conditions.len(),
                    branches
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{one_of, step};
    use crate::hydrate::hydrate;
    use crate::registry::StepRegistry;
    use crate::steps::FnStep;
    use braid_test_utils::MockCompletion;
    use serde_json::json;
    use std::sync::Mutex;

    type Ran = Arc<Mutex<Vec<String>>>;

    fn setup(reply: Value) -> (Arc<HydratedFlow>, StepRuntime, Ran, Arc<MockCompletion>) {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let recorder = ran.clone();
        let mut registry = StepRegistry::with_builtins();
        registry.register(
            "handle",
            FnStep::new(move |instruction, _context| {
                recorder.lock().unwrap().push(instruction.clone());
                async move { Ok(Value::String(instruction)) }
            }),
        );

        let definition = one_of(vec![
            ("the user asks a question", step("handle", "answer")),
            ("the user files a complaint", step("handle", "apologize")),
            ("the user says thanks", step("handle", "welcome")),
        ]);
        let flow = hydrate(&definition, &registry).unwrap();
        let mock = Arc::new(MockCompletion::new().with_structured(reply));
        let runtime = StepRuntime::new(mock.clone());
        (flow, runtime, ran, mock)
    }

    #[tokio::test]
    async fn test_runs_only_selected_branch() {
        let (flow, runtime, ran, mock) = setup(json!({ "index": 1 }));
        let result = runtime.run(&flow, Context::seeded("This is broken!")).await.unwrap();

        assert_eq!(result, Value::from("apologize"));
        assert_eq!(*ran.lock().unwrap(), vec!["apologize".to_string()]);
        assert_eq!(mock.structured_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_minus_one_is_no_branch() {
        let (flow, runtime, ran, _) = setup(json!({ "index": -1 }));
        let err = runtime.run(&flow, Context::new()).await.unwrap_err();

        assert!(matches!(err, BraidError::NoBranchSatisfied { index: -1, branches: 3 }));
        assert!(ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_is_no_branch() {
        let (flow, runtime, ran, _) = setup(json!({ "index": 3 }));
        let err = runtime.run(&flow, Context::new()).await.unwrap_err();

        assert!(matches!(err, BraidError::NoBranchSatisfied { index: 3, .. }));
        assert!(ran.lock().unwrap().is_empty());
    }

    #[test]
    fn test_condition_count_must_match() {
        let definition = FlowDefinition::many("one_of", vec![step("handle", "a")])
            .with_field(CONDITIONS, json!(["x", "y"]));
        let err = OneOfStep.validate(&definition).unwrap_err();
        assert!(err.to_string().contains("2 conditions for 1 branches"));

        let missing = FlowDefinition::many("one_of", vec![step("handle", "a")]);
        assert!(OneOfStep.validate(&missing).is_err());
    }
}
