pub mod config;
pub mod error;
pub mod flow;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{BraidError, Result};
pub use flow::{FlowDefinition, FlowInput};
pub use traits::CompletionService;
pub use types::*;
