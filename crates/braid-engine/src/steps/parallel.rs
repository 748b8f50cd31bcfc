use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::Result;
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

/// Runs every child concurrently with the same context and returns their
/// results as an array in declaration order.
pub struct ParallelStep;

impl StepHandler for ParallelStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let jobs = node
                .children()
                .iter()
                .map(|child| (child.clone(), context.clone()))
                .collect();
            let results = runtime.run_concurrent(jobs).await?;
            Ok(Value::Array(results))
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_many(definition).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{parallel, step};
    use crate::hydrate::hydrate;
    use crate::registry::StepRegistry;
    use crate::steps::FnStep;
    use braid_core::error::BraidError;
    use braid_test_utils::MockCompletion;
    use std::sync::Mutex;
    use std::time::Duration;

    fn registry(contexts: Arc<Mutex<Vec<Vec<String>>>>) -> StepRegistry {
        let mut registry = StepRegistry::with_builtins();
        // Sleeps `<ms>` milliseconds, then returns the instruction.
        registry.register(
            "delayed",
            FnStep::new(move |instruction, context| {
                contexts.lock().unwrap().push(context.entries().to_vec());
                async move {
                    let ms: u64 = instruction.parse().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(Value::String(instruction))
                }
            }),
        );
        registry.register(
            "fail",
            FnStep::new(|instruction, _context| async move {
                Err::<Value, _>(BraidError::step("fail", instruction))
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_results_aligned_to_declaration() {
        let contexts = Arc::new(Mutex::new(Vec::new()));
        let flow = hydrate(
            &parallel(vec![step("delayed", "40"), step("delayed", "0"), step("delayed", "15")]),
            &registry(contexts.clone()),
        )
        .unwrap();

        let runtime = StepRuntime::new(Arc::new(MockCompletion::new()));
        let result = runtime.run(&flow, Context::seeded("topic")).await.unwrap();

        assert_eq!(result, serde_json::json!(["40", "0", "15"]));
        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts.len(), 3);
        assert!(contexts.iter().all(|c| c == &vec!["topic".to_string()]));
    }

    #[tokio::test]
    async fn test_any_failure_fails_group() {
        let flow = hydrate(
            &parallel(vec![step("delayed", "10"), step("fail", "boom")]),
            &registry(Arc::default()),
        )
        .unwrap();

        let runtime = StepRuntime::new(Arc::new(MockCompletion::new()));
        let err = runtime.run(&flow, Context::new()).await.unwrap_err();
        assert!(matches!(err, BraidError::Step { .. }));
    }

    #[test]
    fn test_rejects_instruction_input() {
        let definition = FlowDefinition::leaf("parallel", "oops");
        let err = ParallelStep.validate(&definition).unwrap_err();
        assert!(err.to_string().contains("list of flows"));
    }
}
