use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::Result;
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

/// Runs children one after another. Each child sees the parent context plus
/// the non-empty results of the children before it; the last result wins.
pub struct SequenceStep;

impl StepHandler for SequenceStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut context = context;
            let mut last = Value::Null;
            for child in node.children() {
                let result = runtime.run(child, context.clone()).await?;
                context = context.append_output(&result);
                last = result;
            }
            Ok(last)
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_many(definition).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{sequence, step};
    use crate::hydrate::hydrate;
    use crate::registry::StepRegistry;
    use crate::steps::FnStep;
    use braid_core::error::BraidError;
    use braid_test_utils::MockCompletion;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(String, Vec<String>)>>>;

    /// Registry with `echo` (returns its instruction), `silent` (returns "")
    /// and `fail`, all recording the context they were given.
    fn registry(seen: Seen) -> StepRegistry {
        let mut registry = StepRegistry::with_builtins();
        let echo_seen = seen.clone();
        registry.register(
            "echo",
            FnStep::new(move |instruction, context| {
                echo_seen
                    .lock()
                    .unwrap()
                    .push((instruction.clone(), context.entries().to_vec()));
                async move { Ok(Value::String(instruction)) }
            }),
        );
        let silent_seen = seen;
        registry.register(
            "silent",
            FnStep::new(move |instruction, context| {
                silent_seen
                    .lock()
                    .unwrap()
                    .push((instruction, context.entries().to_vec()));
                async move { Ok(Value::String(String::new())) }
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

    async fn run(definition: FlowDefinition, seen: Seen) -> Result<Value> {
        let flow = hydrate(&definition, &registry(seen))?;
        let runtime = StepRuntime::new(Arc::new(MockCompletion::new()));
        runtime.run(&flow, Context::new()).await
    }

    #[tokio::test]
    async fn test_threads_results_forward() {
        let seen: Seen = Arc::default();
        let result = run(
            sequence(vec![step("echo", "x"), step("echo", "y"), step("echo", "z")]),
            seen.clone(),
        )
        .await
        .unwrap();

        assert_eq!(result, Value::from("z"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, Vec::<String>::new());
        assert_eq!(seen[1].1, vec!["x"]);
        assert_eq!(seen[2].1, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_empty_results_not_appended() {
        let seen: Seen = Arc::default();
        run(
            sequence(vec![step("echo", "x"), step("silent", "-"), step("echo", "y")]),
            seen.clone(),
        )
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[2].1, vec!["x"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_error() {
        let seen: Seen = Arc::default();
        let err = run(
            sequence(vec![step("echo", "x"), step("fail", "boom"), step("echo", "never")]),
            seen.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BraidError::Step { message, .. } if message == "boom"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_sequence_is_null() {
        let result = run(sequence(vec![]), Arc::default()).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn test_rejects_single_input() {
        let definition = FlowDefinition::single("sequence", step("echo", "x"));
        assert!(SequenceStep.validate(&definition).is_err());
    }
}
