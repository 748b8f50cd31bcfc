//! Lifecycle observers wrapped around step handlers.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::Result;
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::registry::{StepHandler, StepRegistry};
use crate::runtime::StepRuntime;

pub type StepStartHook = Arc<dyn Fn(&HydratedFlow, &Context) + Send + Sync>;
pub type StepFinishHook = Arc<dyn Fn(&HydratedFlow, &Value) + Send + Sync>;

/// Callbacks fired around every step invocation.
#[derive(Clone, Default)]
pub struct StepObservers {
    pub on_start: Option<StepStartHook>,
    pub on_finish: Option<StepFinishHook>,
}

impl StepObservers {
    pub fn is_empty(&self) -> bool {
        self.on_start.is_none() && self.on_finish.is_none()
    }

    /// Wrap every handler of `registry` in an [`ObservedStep`]. A registry is
    /// returned unchanged when no observer is set.
    pub fn wrap(&self, registry: StepRegistry) -> StepRegistry {
        if self.is_empty() {
            return registry;
        }
        registry.map_handlers(|inner| {
            Arc::new(ObservedStep {
                inner,
                observers: self.clone(),
            }) as Arc<dyn StepHandler>
        })
    }
}

impl std::fmt::Debug for StepObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepObservers")
            .field("on_start", &self.on_start.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Handler decorator: `on_start` right before the inner handler runs,
/// `on_finish` right after it succeeds. Failures skip `on_finish`.
pub struct ObservedStep {
    inner: Arc<dyn StepHandler>,
    observers: StepObservers,
}

impl StepHandler for ObservedStep {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if let Some(on_start) = &self.observers.on_start {
                on_start(&**node, &context);
            }
            let result = self.inner.run(node, context, runtime).await?;
            if let Some(on_finish) = &self.observers.on_finish {
                on_finish(&**node, &result);
            }
            Ok(result)
        })
    }

    fn validate(&self, definition: &FlowDefinition) -> Result<()> {
        self.inner.validate(definition)
    }
}
