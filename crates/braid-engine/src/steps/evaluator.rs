use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use braid_core::error::{BraidError, Result};
use braid_core::flow::{FlowDefinition, StepFields};
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::judge;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

use super::{CRITERIA, MAX_ITERATIONS};

/// Field spelling accepted alongside `maxIterations`.
const MAX_ITERATIONS_SNAKE: &str = "max_iterations";

/// Runs its child until a judge accepts the result against `criteria`.
///
/// After a rejection the next attempt sees the parent context with an extra
/// entry asking it to address the rejection reason. Child failures are not
/// retried.
pub struct EvaluatorStep;

fn max_iterations_field(fields: &StepFields) -> Option<&Value> {
    fields
        .get(MAX_ITERATIONS)
        .or_else(|| fields.get(MAX_ITERATIONS_SNAKE))
}

/// Instruction appended to the context after a rejection.
pub fn rejection_instruction(reason: &str) -> String {
    format!(
        "When generating the response, make sure to address the following: {}",
        reason
    )
}

impl StepHandler for EvaluatorStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let child = node.child()?;
            let criteria = node.require_str(CRITERIA)?;
            let max_iterations = match max_iterations_field(&node.fields) {
                Some(value) => value.as_u64().map(|n| n as usize).unwrap_or(0),
                None => runtime.engine().default_max_iterations,
            };
            if max_iterations == 0 {
                return Err(BraidError::invalid_flow(
                    node.label(),
                    "`maxIterations` must be at least 1",
                ));
            }

            let mut rejection: Option<String> = None;
            for attempt in 1..=max_iterations {
                let attempt_context = match &rejection {
                    Some(reason) => context.append(rejection_instruction(reason)),
                    None => context.clone(),
                };

                let result = runtime.run(child, attempt_context).await?;
                let judgment =
                    judge::judge_result(runtime.completion(), node.label(), &result, criteria)
                        .await?;

                if judgment.pass {
                    debug!(step = node.label(), attempt, "Result accepted");
                    return Ok(result);
                }

                let reason = judgment.reason.unwrap_or_default();
                warn!(
                    step = node.label(),
                    attempt,
                    max_iterations,
                    reason = %reason,
                    "Result rejected"
                );
                rejection = Some(reason);
            }

            Err(BraidError::IterationsExhausted {
                attempts: max_iterations,
                reason: rejection.unwrap_or_default(),
            })
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_single(definition)?;
        super::expect_str_field(definition, CRITERIA)?;
        if let Some(value) = max_iterations_field(&definition.fields) {
            match value.as_u64() {
                Some(n) if n >= 1 => {}
                _ => {
                    return Err(BraidError::invalid_flow(
                        definition.label(),
                        format!("`maxIterations` must be a positive integer, got {}", value),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{evaluator, step};
    use crate::hydrate::hydrate;
    use crate::registry::StepRegistry;
    use crate::steps::FnStep;
    use braid_core::config::EngineConfig;
    use braid_test_utils::MockCompletion;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Contexts = Arc<Mutex<Vec<Vec<String>>>>;

    /// `draft` returns "draft <n>" for its n-th call and records its context.
    fn registry(contexts: Contexts) -> StepRegistry {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = StepRegistry::with_builtins();
        registry.register(
            "draft",
            FnStep::new(move |_instruction, context| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                contexts.lock().unwrap().push(context.entries().to_vec());
                async move { Ok(Value::String(format!("draft {}", n))) }
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

    fn rejected(reason: &str) -> Value {
        json!({ "pass": false, "reason": reason })
    }

    #[tokio::test]
    async fn test_passes_on_third_attempt() {
        let contexts: Contexts = Arc::default();
        let flow = hydrate(
            &evaluator(step("draft", "write"), "under 10 words").with_field(MAX_ITERATIONS, 3),
            &registry(contexts.clone()),
        )
        .unwrap();
        let mock = Arc::new(
            MockCompletion::new()
                .with_structured(rejected("too long"))
                .with_structured(rejected("still too long"))
                .with_structured(json!({ "pass": true })),
        );
        let runtime = StepRuntime::new(mock.clone());

        let result = runtime.run(&flow, Context::seeded("topic")).await.unwrap();
        assert_eq!(result, Value::from("draft 3"));

        let contexts = contexts.lock().unwrap();
        assert_eq!(contexts.len(), 3);
        assert_eq!(contexts[0], vec!["topic"]);
        assert_eq!(contexts[1], vec!["topic".to_string(), rejection_instruction("too long")]);
        assert_eq!(
            contexts[2],
            vec!["topic".to_string(), rejection_instruction("still too long")]
        );

        let judged = mock.structured_calls();
        assert!(judged[2].0.prompt.contains("\"draft 3\""));
        assert!(judged[2].0.prompt.contains("under 10 words"));
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_reason() {
        let contexts: Contexts = Arc::default();
        let flow = hydrate(
            &evaluator(step("draft", "write"), "perfect").with_field(MAX_ITERATIONS, 2),
            &registry(contexts.clone()),
        )
        .unwrap();
        let runtime = StepRuntime::new(Arc::new(
            MockCompletion::new()
                .with_structured(rejected("first"))
                .with_structured(rejected("second")),
        ));

        let err = runtime.run(&flow, Context::new()).await.unwrap_err();
        assert!(matches!(
            err,
            BraidError::IterationsExhausted { attempts: 2, ref reason } if reason == "second"
        ));
        assert_eq!(contexts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_default_iterations_from_engine_config() {
        let contexts: Contexts = Arc::default();
        let flow = hydrate(&evaluator(step("draft", "write"), "x"), &registry(contexts.clone()))
            .unwrap();
        let runtime = StepRuntime::new(Arc::new(
            MockCompletion::new()
                .with_structured(rejected("a"))
                .with_structured(rejected("b")),
        ))
        .with_engine_config(EngineConfig {
            default_max_iterations: 2,
        });

        let err = runtime.run(&flow, Context::new()).await.unwrap_err();
        assert!(matches!(err, BraidError::IterationsExhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_child_error_not_retried() {
        let flow = hydrate(&evaluator(step("fail", "boom"), "x"), &registry(Arc::default()))
            .unwrap();
        let mock = Arc::new(MockCompletion::new());
        let runtime = StepRuntime::new(mock.clone());

        let err = runtime.run(&flow, Context::new()).await.unwrap_err();
        assert!(matches!(err, BraidError::Step { .. }));
        assert!(mock.structured_calls().is_empty());
    }

    #[test]
    fn test_validation() {
        let ok = evaluator(step("draft", "x"), "c").with_field(MAX_ITERATIONS_SNAKE, 5);
        assert!(EvaluatorStep.validate(&ok).is_ok());

        let zero = evaluator(step("draft", "x"), "c").with_field(MAX_ITERATIONS, 0);
        assert!(EvaluatorStep.validate(&zero).is_err());

        let no_criteria = FlowDefinition::single("evaluator", step("draft", "x"));
        assert!(EvaluatorStep.validate(&no_criteria).is_err());
    }
}
