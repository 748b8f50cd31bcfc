//! Structured decisions asked of the completion service by the built-in
//! composites: branch selection, pass/fail evaluation, best-of selection and
//! item splitting.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use braid_core::error::{BraidError, Result};
use braid_core::traits::CompletionService;
use braid_core::types::{Context, Prompt};

const ROUTER_SYSTEM: &str = "You are a condition evaluator. You will be given an array of conditions and a context.
Evaluate each condition against the context and return the index of the condition that is true, or -1 if none is.";

const EVALUATOR_SYSTEM: &str = "You are a criteria evaluator. You will be given a result and a criteria.
Decide whether the result satisfies the criteria. When it does not, explain why in `reason`.";

const BEST_OF_SYSTEM: &str = "You are a best of all evaluator. You will be given a list of results and a condition.
Evaluate the results and return the index of the one that best satisfies the condition.";

const FOR_EACH_SYSTEM: &str = "You are a loop agent. You will be given a context and a description of an item.
Break the context into an array of items. Each item must satisfy the provided description.";

/// Verdict of an evaluator judge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Judgment {
    pub pass: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct IndexReply {
    index: i64,
}

#[derive(Deserialize)]
struct ItemsReply {
    items: Vec<Value>,
}

fn index_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "index": { "type": "integer", "description": description }
        },
        "required": ["index"]
    })
}

fn judgment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "pass": { "type": "boolean", "description": "Whether the result satisfies the criteria." },
            "reason": { "type": "string", "description": "Why the result does not satisfy the criteria." }
        },
        "required": ["pass"]
    })
}

/// Schema for the items of a for-each split: a free-text description becomes
/// a described string, an object is used as the item schema itself.
pub fn items_schema(item: &Value) -> Value {
    let item_schema = match item {
        Value::String(description) => json!({ "type": "string", "description": description }),
        other => other.clone(),
    };
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": item_schema,
                "description": "The items to run the nested flow for."
            }
        },
        "required": ["items"]
    })
}

fn to_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

async fn ask<T: DeserializeOwned>(
    completion: &dyn CompletionService,
    step: &str,
    prompt: Prompt,
    schema: Value,
) -> Result<T> {
    let reply = completion.generate_structured(prompt, schema).await?;
    serde_json::from_value(reply.clone()).map_err(|e| {
        warn!(step, reply = %reply, error = %e, "Judge reply does not match schema");
        BraidError::MalformedJudgment {
            step: step.to_string(),
            message: e.to_string(),
        }
    })
}

/// Ask which condition holds for `context`. Returns the raw index, which may
/// be -1 or out of range; the caller decides what that means.
pub async fn select_branch(
    completion: &dyn CompletionService,
    step: &str,
    context: &Context,
    conditions: &[String],
) -> Result<i64> {
    let prompt = Prompt::new(format!(
        "Here is the context: {}\nHere is the array of conditions: {}",
        context.to_json(),
        to_json(&conditions)
    ))
    .with_system(ROUTER_SYSTEM);

    let reply: IndexReply = ask(
        completion,
        step,
        prompt,
        index_schema("The index of the condition that is met, or -1 if no condition was met."),
    )
    .await?;
    debug!(step, index = reply.index, "Router selected branch");
    Ok(reply.index)
}

/// Ask whether `result` satisfies `criteria`.
pub async fn judge_result(
    completion: &dyn CompletionService,
    step: &str,
    result: &Value,
    criteria: &str,
) -> Result<Judgment> {
    let prompt = Prompt::new(format!(
        "Here is the result: {}\nHere is the criteria: {}",
        to_json(result),
        to_json(&criteria)
    ))
    .with_system(EVALUATOR_SYSTEM);

    ask(completion, step, prompt, judgment_schema()).await
}

/// Ask which of `results` best satisfies `criteria`.
pub async fn select_best(
    completion: &dyn CompletionService,
    step: &str,
    results: &[Value],
    criteria: &str,
) -> Result<i64> {
    let prompt = Prompt::new(format!(
        "Here is the list of results: {}\nHere is the condition: {}",
        to_json(&results),
        to_json(&criteria)
    ))
    .with_system(BEST_OF_SYSTEM);

    let reply: IndexReply = ask(
        completion,
        step,
        prompt,
        index_schema("The index of the best result."),
    )
    .await?;
    debug!(step, index = reply.index, "Best result selected");
    Ok(reply.index)
}

/// Split the most recent context entry into items matching `item`.
pub async fn split_items(
    completion: &dyn CompletionService,
    step: &str,
    context: &Context,
    item: &Value,
) -> Result<Vec<Value>> {
    let description = match item {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let prompt = Prompt::new(format!(
        "Here is the context: {}\nHere is the description of what each item in the list should be: {}",
        to_json(&context.last().unwrap_or_default()),
        description
    ))
    .with_system(FOR_EACH_SYSTEM);

    let reply: ItemsReply = ask(completion, step, prompt, items_schema(item)).await?;
    debug!(step, items = reply.items.len(), "Split context into items");
    Ok(reply.items)
}
