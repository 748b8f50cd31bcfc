use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::flow::FlowDefinition;
use braid_core::traits::CompletionService;
use braid_core::types::{Context, Prompt};

use crate::hydrate::HydratedFlow;
use crate::registry::StepHandler;
use crate::runtime::StepRuntime;

/// Terminal step that answers its instruction with the completion service.
///
/// The prompt carries the JSON-rendered context followed by the instruction.
/// Without a completion service of its own the step uses the runtime's.
#[derive(Default)]
pub struct AgentStep {
    system: Option<String>,
    completion: Option<Arc<dyn CompletionService>>,
}

impl AgentStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Use a dedicated completion service (e.g. a different model).
    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Prompt sent for `instruction` given `context`.
    pub fn prompt(&self, instruction: &str, context: &Context) -> Prompt {
        let instruction = serde_json::to_string(instruction).unwrap_or_default();
        let prompt = Prompt::new(format!(
            "{}\nHere is the instruction: {}",
            context.to_json(),
            instruction
        ));
        match &self.system {
            Some(system) => prompt.with_system(system.clone()),
            None => prompt,
        }
    }
}

impl StepHandler for AgentStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let instruction = node.instruction().ok_or_else(|| {
                BraidError::invalid_flow(node.label(), "agent steps take an instruction")
            })?;
            let completion = match &self.completion {
                Some(own) => own.as_ref(),
                None => runtime.completion(),
            };

            let text = completion
                .generate_text(self.prompt(instruction, &context))
                .await?;
            debug!(step = node.label(), chars = text.len(), "Agent responded");
            Ok(Value::String(text))
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        super::expect_instruction(definition)
    }
}
