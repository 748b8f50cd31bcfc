mod steps;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use braid_core::config::AppConfig;
use braid_core::flow::FlowDefinition;
use braid_engine::{execute, hydrate, ExecuteOptions, StepRegistry};

#[derive(Parser)]
#[command(name = "braid", version, about = "Declarative LLM workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "braid.toml")]
    config: PathBuf,

    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow and print its result
    Run {
        /// Flow definition (.json or .toml)
        flow: PathBuf,
        /// Seed the root context with this text
        #[arg(short, long)]
        input: Option<String>,
        /// Print each step as it starts and finishes
        #[arg(long)]
        trace: bool,
    },
    /// Check that a flow hydrates against the configured steps
    Validate {
        /// Flow definition (.json or .toml)
        flow: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "braid=debug,info" } else { "braid=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "braid", &mut std::io::stdout());
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate { flow } => {
            let definition = load_flow(&flow)?;
            let config = load_config_file(&cli.config)?;
            let mut registry = StepRegistry::with_builtins();
            registry.extend(&steps::declared_steps(config.as_ref()));

            hydrate(&definition, &registry)?;
            println!("{} is valid ({} steps known)", flow.display(), registry.len());
        }
        Commands::Run { flow, input, trace } => {
            let definition = load_flow(&flow)?;
            let config = load_config(&cli.config)?;
            let completion = braid_llm::completion_from_config(&config)?;
            info!(
                model = %config.model.model_id,
                provider = %config.model.provider,
                "Completion service ready"
            );

            let mut options = ExecuteOptions::new(Arc::new(completion))
                .with_steps(steps::configured_steps(&config)?)
                .with_engine_config(config.engine.clone());
            if let Some(input) = input {
                options = options.with_input(input);
            }
            if trace {
                options = options
                    .on_step_start(|node, context| {
                        eprintln!("> {} ({} context entries)", node.label(), context.len());
                    })
                    .on_step_finish(|node, _| eprintln!("< {}", node.label()));
            }

            let result = execute(&definition, options).await?;
            match result {
                serde_json::Value::String(text) => println!("{}", text),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
        }
    }

    Ok(())
}

/// Load a flow definition; `.toml` files are parsed as TOML, anything else as JSON.
fn load_flow(path: &Path) -> anyhow::Result<FlowDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading flow {}", path.display()))?;
    let definition = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => FlowDefinition::from_toml(&text)?,
        _ => FlowDefinition::from_json(&text)?,
    };
    Ok(definition)
}

/// The config file when present, then `~/.braid/config.toml`, then the environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    match load_config_file(path)? {
        Some(config) => Ok(config),
        None => Ok(AppConfig::from_env()?),
    }
}

/// The config file or `~/.braid/config.toml`, whichever exists first.
/// A file that exists but does not parse is an error.
fn load_config_file(path: &Path) -> anyhow::Result<Option<AppConfig>> {
    if path.exists() {
        return Ok(Some(AppConfig::load(path)?));
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".braid").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(Some(AppConfig::load(&home_config)?));
        }
    }

    Ok(None)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_test_utils::{temp_file, test_config_toml};

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let file = temp_file("[model\nmodel_id = ", "toml");
        assert!(load_config_file(file.path()).is_err());
    }

    #[test]
    fn test_config_file_loaded() {
        let file = temp_file(test_config_toml(), "toml");
        let config = load_config_file(file.path()).unwrap().unwrap();
        assert_eq!(config.model.model_id, "llama3");
    }
}
