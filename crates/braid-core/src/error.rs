use thiserror::Error;

#[derive(Debug, Error)]
pub enum BraidError {
    // Hydration errors
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Invalid flow at step {step}: {message}")]
    InvalidFlow { step: String, message: String },

    // Composite step errors
    #[error("No branch satisfied (judge returned index {index} for {branches} branches)")]
    NoBranchSatisfied { index: i64, branches: usize },

    #[error("Iterations exhausted after {attempts} attempts: {reason}")]
    IterationsExhausted { attempts: usize, reason: String },

    #[error("Invalid selection: judge returned index {index} for {candidates} candidates")]
    InvalidSelection { index: i64, candidates: usize },

    #[error("Malformed judgment from {step}: {message}")]
    MalformedJudgment { step: String, message: String },

    #[error("Step failed: {step}: {message}")]
    Step { step: String, message: String },

    #[error("Concurrent branch failed: {0}")]
    TaskFailed(String),

    // Completion service errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BraidError {
    /// Build a `Step` error for a failing user step.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Build an `InvalidFlow` error.
    pub fn invalid_flow(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFlow {
            step: step.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BraidError>;
