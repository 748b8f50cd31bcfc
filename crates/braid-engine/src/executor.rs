use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use braid_core::config::EngineConfig;
use braid_core::error::Result;
use braid_core::flow::FlowDefinition;
use braid_core::traits::CompletionService;
use braid_core::types::Context;

use crate::hydrate::{hydrate, HydratedFlow};
use crate::observe::StepObservers;
use crate::registry::{StepHandler, StepRegistry};
use crate::runtime::StepRuntime;

/// Everything `execute` needs besides the definition.
pub struct ExecuteOptions {
    /// User steps; these override built-ins of the same name.
    pub steps: StepRegistry,
    pub completion: Arc<dyn CompletionService>,
    /// Seeds the root context as `[input]` when set.
    pub input: Option<String>,
    pub observers: StepObservers,
    pub engine: EngineConfig,
}

impl ExecuteOptions {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            steps: StepRegistry::new(),
            completion,
            input: None,
            observers: StepObservers::default(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, handler: impl StepHandler) -> Self {
        self.steps.register(name, handler);
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn on_step_start(
        mut self,
        hook: impl Fn(&HydratedFlow, &Context) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_start = Some(Arc::new(hook));
        self
    }

    pub fn on_step_finish(
        mut self,
        hook: impl Fn(&HydratedFlow, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.observers.on_finish = Some(Arc::new(hook));
        self
    }

    /// Built-ins overlaid with the user steps, wrapped with observers if any.
    pub fn registry(&self) -> StepRegistry {
        let mut registry = StepRegistry::with_builtins();
        registry.extend(&self.steps);
        self.observers.wrap(registry)
    }
}

/// Hydrate `definition` and run it to completion.
pub async fn execute(definition: &FlowDefinition, options: ExecuteOptions) -> Result<Value> {
    let run_id = Uuid::new_v4();
    let span = info_span!("flow", %run_id, root = definition.label());

    async move {
        let flow = hydrate(definition, &options.registry())?;
        let context = options.input.map(Context::seeded).unwrap_or_default();
        let runtime = StepRuntime::new(options.completion).with_engine_config(options.engine);

        info!(step_kind = %flow.step_kind, seeded = !context.is_empty(), "Flow started");
        let start = Instant::now();
        let result = runtime.run(&flow, context).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(elapsed_ms, "Flow finished"),
            Err(e) => warn!(elapsed_ms, error = %e, "Flow failed"),
        }
        result
    }
    .instrument(span)
    .await
}
