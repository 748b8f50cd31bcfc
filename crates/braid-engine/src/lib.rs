//! Flow execution engine.
//!
//! A [`FlowDefinition`](braid_core::FlowDefinition) is hydrated against a
//! [`StepRegistry`] into a tree of [`HydratedFlow`] nodes, each bound to the
//! [`StepHandler`] that runs it. [`execute`] builds the effective registry
//! (built-in composites plus user steps), hydrates the definition and runs
//! the root node through a [`StepRuntime`].

pub mod executor;
pub mod flows;
pub mod hydrate;
pub mod judge;
pub mod observe;
pub mod registry;
pub mod runtime;
pub mod steps;

pub use executor::{execute, ExecuteOptions};
pub use hydrate::{hydrate, HydratedFlow, HydratedInput};
pub use observe::{ObservedStep, StepObservers};
pub use registry::{StepHandler, StepRegistry};
pub use runtime::StepRuntime;
pub use steps::{AgentStep, FnStep};
