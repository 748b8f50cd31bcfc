use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::flow::{FlowDefinition, StepFields};
use braid_core::types::{render_output, Context};

use crate::hydrate::HydratedFlow;
use crate::judge;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

use super::ITEM_DESCRIPTOR;

/// Short field spelling accepted alongside `itemDescriptor`.
const ITEM: &str = "item";

/// Splits the latest context entry into items and runs its child once per
/// item, concurrently.
///
/// Each run sees the parent context with the last entry replaced by the
/// item. Results come back in item order.
pub struct ForEachStep;

fn item_descriptor(fields: &StepFields) -> Option<&Value> {
    fields.get(ITEM_DESCRIPTOR).or_else(|| fields.get(ITEM))
}

fn missing_descriptor(step: &str) -> BraidError {
    BraidError::invalid_flow(step, "missing field `itemDescriptor`")
}

impl StepHandler for ForEachStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let child = node.child()?;
            let item =
                item_descriptor(&node.fields).ok_or_else(|| missing_descriptor(node.label()))?;

            let items =
                judge::split_items(runtime.completion(), node.label(), &context, item).await?;
            debug!(step = node.label(), items = items.len(), "Running nested flow per item");

            let jobs = items
                .iter()
                .map(|item| {
                    let entry = render_output(item).unwrap_or_default();
                    (child.clone(), context.replace_last(entry))
                })
                .collect();
            let results = runtime.run_concurrent(jobs).await?;
            Ok(Value::Array(results))
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_single(definition)?;
        match item_descriptor(&definition.fields) {
            Some(Value::String(_)) | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(BraidError::invalid_flow(
                definition.label(),
                format!(
                    "`itemDescriptor` must be a description or a JSON schema, got {}",
                    other
                ),
            )),
            None => Err(missing_descriptor(definition.label())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{for_each, step};
    use crate::hydrate::hydrate;
    use crate::registry::StepRegistry;
    use crate::steps::FnStep;
    use braid_test_utils::MockCompletion;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    type Contexts = Arc<Mutex<Vec<Vec<String>>>>;

    /// `summarize` returns "summary of <last entry>", slower for earlier items.
    fn registry(contexts: Contexts) -> StepRegistry {
        let mut registry = StepRegistry::with_builtins();
        registry.register(
            "summarize",
            FnStep::new(move |_instruction, context| {
                contexts.lock().unwrap().push(context.entries().to_vec());
                let last = context.last().unwrap_or_default().to_string();
                async move {
                    let delay = if last == "alpha" { 30 } else { 1 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(Value::String(format!("summary of {}", last)))
                }
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_runs_child_per_item_in_order() {
        let contexts: Contexts = Arc::default();
        let flow = hydrate(
            &for_each(step("summarize", "sum up"), "a project name"),
            &registry(contexts.clone()),
        )
        .unwrap();
        let mock = Arc::new(
            MockCompletion::new().with_structured(json!({ "items": ["alpha", "beta", "gamma"] })),
        );
        let runtime = StepRuntime::new(mock.clone());

        let context = Context::from(vec!["goal", "alpha, beta and gamma"]);
        let result = runtime.run(&flow, context).await.unwrap();

        assert_eq!(
            result,
            json!(["summary of alpha", "summary of beta", "summary of gamma"])
        );

        let mut seen = contexts.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                vec!["goal", "alpha"],
                vec!["goal", "beta"],
                vec!["goal", "gamma"],
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_context_becomes_item() {
        let contexts: Contexts = Arc::default();
        let flow = hydrate(
            &for_each(step("summarize", "sum up"), "a word"),
            &registry(contexts.clone()),
        )
        .unwrap();
        let runtime = StepRuntime::new(Arc::new(
            MockCompletion::new().with_structured(json!({ "items": ["solo"] })),
        ));

        runtime.run(&flow, Context::new()).await.unwrap();
        assert_eq!(*contexts.lock().unwrap(), vec![vec!["solo".to_string()]]);
    }

    #[tokio::test]
    async fn test_object_items_rendered_as_json() {
        let contexts: Contexts = Arc::default();
        let schema = json!({ "type": "object", "properties": { "name": { "type": "string" } } });
        let flow = hydrate(
            &for_each(step("summarize", "sum up"), schema),
            &registry(contexts.clone()),
        )
        .unwrap();
        let runtime = StepRuntime::new(Arc::new(
            MockCompletion::new().with_structured(json!({ "items": [{ "name": "braid" }] })),
        ));

        runtime.run(&flow, Context::seeded("list")).await.unwrap();
        assert_eq!(contexts.lock().unwrap()[0], vec![r#"{"name":"braid"}"#]);
    }

    #[tokio::test]
    async fn test_json_flow_with_item_descriptor() {
        let contexts: Contexts = Arc::default();
        let definition = FlowDefinition::from_json(
            r#"{
                "stepKind": "for_each",
                "itemDescriptor": "a letter",
                "input": { "stepKind": "summarize", "input": "sum up" }
            }"#,
        )
        .unwrap();
        let flow = hydrate(&definition, &registry(contexts.clone())).unwrap();
        let mock = Arc::new(MockCompletion::new().with_structured(json!({ "items": ["a", "b"] })));
        let runtime = StepRuntime::new(mock.clone());

        let result = runtime.run(&flow, Context::seeded("a b")).await.unwrap();
        assert_eq!(result, json!(["summary of a", "summary of b"]));

        let (prompt, schema) = &mock.structured_calls()[0];
        assert!(prompt.prompt.contains("a b"));
        assert_eq!(schema["properties"]["items"]["items"]["description"], "a letter");
    }

    #[test]
    fn test_item_alias_accepted() {
        let definition = FlowDefinition::from_json(
            r#"{
                "stepKind": "for_each",
                "item": "a letter",
                "input": { "stepKind": "summarize", "input": "sum up" }
            }"#,
        )
        .unwrap();
        assert!(ForEachStep.validate(&definition).is_ok());
        assert!(hydrate(&definition, &registry(Arc::default())).is_ok());
    }

    #[test]
    fn test_item_must_be_text_or_schema() {
        let bad = for_each(step("summarize", "x"), 5);
        assert!(ForEachStep.validate(&bad).is_err());

        let missing = FlowDefinition::single("for_each", step("summarize", "x"));
        assert!(ForEachStep.validate(&missing).is_err());
    }
}
