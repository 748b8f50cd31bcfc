use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, Instrument};

use braid_core::config::EngineConfig;
use braid_core::error::{BraidError, Result};
use braid_core::traits::CompletionService;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;

/// Services available to a running step: child execution and the
/// completion service used by judges and agent steps.
#[derive(Clone)]
pub struct StepRuntime {
    completion: Arc<dyn CompletionService>,
    engine: EngineConfig,
}

impl StepRuntime {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            engine: EngineConfig::default(),
        }
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn completion(&self) -> &dyn CompletionService {
        self.completion.as_ref()
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Run a node with its bound handler.
    pub async fn run(&self, node: &Arc<HydratedFlow>, context: Context) -> Result<Value> {
        debug!(
            step = node.label(),
            kind = %node.step_kind,
            context_entries = context.len(),
            "Running step"
        );
        node.handler().run(node, context, self).await
    }

    /// Run each `(node, context)` pair as its own task and collect the
    /// results in input order.
    ///
    /// The first failure is returned as soon as it is observed. Tasks still
    /// running at that point are detached: they finish on their own and
    /// their results are dropped. Each task runs inside the caller's span.
    pub async fn run_concurrent(
        &self,
        jobs: Vec<(Arc<HydratedFlow>, Context)>,
    ) -> Result<Vec<Value>> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(node, context)| {
                let runtime = self.clone();
                tokio::spawn(async move { runtime.run(&node, context).await }.in_current_span())
            })
            .collect();

        try_join_all(handles.into_iter().map(|handle| async move {
            handle
                .await
                .map_err(|e| BraidError::TaskFailed(e.to_string()))?
        }))
        .await
    }
}

impl std::fmt::Debug for StepRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRuntime")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
