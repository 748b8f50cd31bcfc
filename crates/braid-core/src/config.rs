use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BraidError, Result};

/// Top-level Braid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Declarative agent steps, keyed by the step kind they register under.
    #[serde(default)]
    pub steps: HashMap<String, AgentStepConfig>,
}

/// Engine-wide knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Evaluator attempts when a flow does not set `maxIterations`.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> usize { 3 }

/// An LLM-backed terminal step declared in config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStepConfig {
    /// System prompt for this step.
    #[serde(default)]
    pub system: Option<String>,
    /// Model override; the top-level `[model]` is used when absent.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

impl ModelConfig {
    /// Minimal config for a model id with defaults everywhere else.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: HashMap::new(),
            retry: None,
        }
    }
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BraidError::ConfigNotFound(path.display().to_string()))?;

        debug!(path = %path.display(), "Loading config");
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| BraidError::Config(e.to_string()))
    }

    /// Build a config from environment variables alone.
    ///
    /// Reads `BRAID_MODEL` (default `gpt-4o-mini`), `BRAID_BASE_URL` and
    /// `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let base_url = std::env::var("BRAID_BASE_URL").ok();
        if api_key.is_none() && base_url.is_none() {
            return Err(BraidError::Config(
                "no config file found and neither OPENAI_API_KEY nor BRAID_BASE_URL is set".into(),
            ));
        }

        let model_id = std::env::var("BRAID_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        debug!(model = %model_id, "Using config from environment");
        let mut model = ModelConfig::new(model_id);
        model.api_key = api_key;
        model.base_url = base_url;

        Ok(Self {
            model,
            fallback_models: vec![],
            engine: EngineConfig::default(),
            steps: HashMap::new(),
        })
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep the reference when the variable is unset
                Err(_) => {
                    warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
