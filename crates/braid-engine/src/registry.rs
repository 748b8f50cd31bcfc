use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::Result;
use braid_core::flow::FlowDefinition;
use braid_core::types::Context;

use crate::hydrate::HydratedFlow;
use crate::runtime::StepRuntime;
use crate::steps;

/// Executable behavior bound to a step kind.
///
/// Terminal steps read `node.instruction()`; composites recurse into
/// `node.children()` through the runtime.
pub trait StepHandler: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        node: &'a Arc<HydratedFlow>,
        context: Context,
        runtime: &'a StepRuntime,
    ) -> BoxFuture<'a, Result<Value>>;

    /// Check the shape of a definition at hydration time.
    fn validate(&self, _definition: &FlowDefinition) -> Result<()> {
        Ok(())
    }
}

/// Registry mapping step-kind names to handlers.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: impl StepHandler) {
        self.steps.insert(name.into(), Arc::new(handler));
    }

    /// Unregister a handler by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.steps.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.steps.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Copy every entry of `other` into this registry. Entries of `other` win.
    pub fn extend(&mut self, other: &StepRegistry) {
        for (name, handler) in &other.steps {
            self.steps.insert(name.clone(), handler.clone());
        }
    }

    /// Replace every handler with `wrap(handler)`.
    pub fn map_handlers(
        self,
        mut wrap: impl FnMut(Arc<dyn StepHandler>) -> Arc<dyn StepHandler>,
    ) -> Self {
        Self {
            steps: self
                .steps
                .into_iter()
                .map(|(name, handler)| (name, wrap(handler)))
                .collect(),
        }
    }

    /// Create a registry with the six built-in composites registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(steps::SEQUENCE, steps::sequence::SequenceStep);
        registry.register(steps::PARALLEL, steps::parallel::ParallelStep);
        registry.register(steps::ONE_OF, steps::one_of::OneOfStep);
        registry.register(steps::EVALUATOR, steps::evaluator::EvaluatorStep);
        registry.register(steps::FOR_EACH, steps::for_each::ForEachStep);
        registry.register(steps::BEST_OF_ALL, steps::best_of_all::BestOfAllStep);
        registry
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list())
            .finish()
    }
}
