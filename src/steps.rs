//! Steps the CLI registers on top of the built-ins.

use std::sync::Arc;

use serde_json::Value;

use braid_core::config::AppConfig;
use braid_core::error::{BraidError, Result};
use braid_engine::{AgentStep, FnStep, StepRegistry};

/// Step kind of the interactive stdin step.
pub const USER_INPUT: &str = "user_input";

/// Agent steps declared under `[steps.*]`, each with its own model when one
/// is configured, plus `user_input`.
pub fn configured_steps(config: &AppConfig) -> Result<StepRegistry> {
    let mut registry = StepRegistry::new();
    registry.register(USER_INPUT, user_input());

    for (name, step) in &config.steps {
        let mut agent = AgentStep::new();
        if let Some(system) = &step.system {
            agent = agent.with_system(system.clone());
        }
        if let Some(model) = &step.model {
            let completion = braid_llm::completion_for(model, &[])?;
            agent = agent.with_completion(Arc::new(completion));
        }
        registry.register(name.clone(), agent);
    }
    Ok(registry)
}

/// Step names known without building any completion service; used for validation.
pub fn declared_steps(config: Option<&AppConfig>) -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(USER_INPUT, user_input());
    if let Some(config) = config {
        for name in config.steps.keys() {
            registry.register(name.clone(), AgentStep::new());
        }
    }
    registry
}

/// Asks the user on the terminal, using the instruction as the prompt.
fn user_input() -> impl braid_engine::StepHandler {
    FnStep::new(|instruction, _context| async move {
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(instruction)
                .interact_text()
        })
        .await
        .map_err(|e| BraidError::TaskFailed(e.to_string()))?
        .map_err(|e| BraidError::step(USER_INPUT, e.to_string()))?;

        Ok(Value::String(answer))
    })
}
