mod application;
mod config;
mod domain;
mod infrastructure;

use application::agent::{directive_format, Agent, AgentOptions, Termination};
use application::repl;
use application::tooling::builtin::register_builtin_tools;
use application::tooling::{ExecutionPolicy, ToolExecutor, ToolRegistry};
use clap::{Parser, ValueEnum};
use config::{AppConfig, ProviderKind};
use infrastructure::model::{GeminiClient, ModelProvider, OllamaClient};
use serde_json::json;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "orrery",
    version,
    about = "Tool-using model agent for the terminal"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<String>,
    /// Extra system prompt, overrides the configured one.
    #[arg(long)]
    system: Option<String>,
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    prompt_file: Option<String>,
    /// Defaults to repl, or once when a prompt is given.
    #[arg(long, value_enum)]
    mode: Option<RunMode>,
    prompt: Vec<String>,
}

impl Cli {
    fn run_mode(&self) -> Result<RunMode, &'static str> {
        let has_prompt = self.prompt_file.is_some() || !self.prompt.is_empty();
        match self.mode {
            Some(RunMode::Repl) if has_prompt => {
                Err("a prompt cannot be combined with --mode repl")
            }
            Some(mode) => Ok(mode),
            None if has_prompt => Ok(RunMode::Once),
            None => Ok(RunMode::Repl),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Gemini,
    Ollama,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gemini => ProviderKind::Gemini,
            ProviderArg::Ollama => ProviderKind::Ollama,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// Interactive session.
    Repl,
    /// Answer one prompt and print the result as JSON.
    Once,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Starting orrery");

    let cli = Cli::parse();
    let mode = cli.run_mode()?;
    debug!(?mode, config = ?cli.config, provider = ?cli.provider, "CLI arguments parsed");

    let expanded_config = cli
        .config
        .as_deref()
        .map(|path| shellexpand::tilde(path).into_owned());
    let mut config = AppConfig::load(expanded_config.as_deref().map(Path::new))?;

    if let Some(provider) = cli.provider {
        config.provider = provider.into();
    }
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    if let Some(endpoint) = cli.endpoint.clone() {
        config.endpoint = Some(endpoint);
    }
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }
    if cli.system.is_some() {
        config.system_prompt = cli.system.clone();
    }

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry)?;
    let registry = Arc::new(registry);
    let executor = ToolExecutor::new(
        registry.clone(),
        ExecutionPolicy {
            timeout: Duration::from_secs(config.tool_timeout_secs),
        },
    );
    let format = directive_format(config.directive_format);
    let options = AgentOptions {
        max_steps: config.max_steps,
        system_prompt: config.system_prompt.clone(),
    };
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    info!(provider = ?config.provider, model = %config.model, "Provider selected");
    match config.provider {
        ProviderKind::Gemini => {
            let api_key = std::env::var(&config.api_key_env).ok();
            if api_key.is_none() {
                warn!(var = %config.api_key_env, "API key variable is not set");
            }
            let provider = GeminiClient::new(config.endpoint.clone(), api_key, request_timeout);
            let agent = Agent::new(
                provider,
                config.model.clone(),
                registry,
                executor,
                format,
                options,
            );
            run(agent, mode, &cli).await
        }
        ProviderKind::Ollama => {
            let provider = OllamaClient::new(config.endpoint.clone(), request_timeout);
            let agent = Agent::new(
                provider,
                config.model.clone(),
                registry,
                executor,
                format,
                options,
            );
            run(agent, mode, &cli).await
        }
    }
}

async fn run<P: ModelProvider>(
    mut agent: Agent<P>,
    mode: RunMode,
    cli: &Cli,
) -> Result<(), Box<dyn Error>> {
    match mode {
        RunMode::Repl => {
            repl::run(&mut agent).await?;
        }
        RunMode::Once => {
            let prompt = load_prompt(cli)?;
            let reply = agent.send_user_message(&prompt).await?;

            let output = json!({
                "session_id": agent.conversation().session_id(),
                "content": reply.text,
                "terminated": match reply.termination {
                    Termination::Completed => "completed",
                    Termination::StepLimit => "step_limit",
                },
                "tool_steps": reply
                    .steps
                    .iter()
                    .map(|step| json!({
                        "call_id": step.call_id,
                        "tool": step.tool,
                        "success": step.success,
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    info!("Execution finished");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.prompt_file {
        info!(path = %path, "Loading prompt from file");
        let expanded = shellexpand::tilde(path).into_owned();
        let content = fs::read_to_string(expanded)?;
        return Ok(content.trim().to_string());
    }

    if !cli.prompt.is_empty() {
        return Ok(cli.prompt.join(" ").trim().to_string());
    }

    warn!("Prompt not provided via arguments or file");
    Err("prompt required via arguments or --prompt-file".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_prompt_implies_once_mode() {
        let cli = Cli::parse_from(["orrery", "do", "the", "thing"]);
        assert_eq!(cli.run_mode().expect("mode resolves"), RunMode::Once);
    }

    #[test]
    fn prompt_file_implies_once_mode() {
        let cli = Cli::parse_from(["orrery", "--prompt-file", "p.txt"]);
        assert_eq!(cli.run_mode().expect("mode resolves"), RunMode::Once);
    }

    #[test]
    fn no_arguments_default_to_repl() {
        let cli = Cli::parse_from(["orrery"]);
        assert_eq!(cli.run_mode().expect("mode resolves"), RunMode::Repl);
    }

    #[test]
    fn explicit_repl_rejects_a_positional_prompt() {
        let cli = Cli::parse_from(["orrery", "--mode", "repl", "stray"]);
        assert!(cli.run_mode().is_err());
    }
}
