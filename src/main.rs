use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use riddler_core::config::AppConfig;
use riddler_core::types::SessionId;
use riddler_pipeline::{SessionManager, Workflow};
use riddler_stages::{riddle_workflow, Services};

#[derive(Parser)]
#[command(name = "riddler", version, about = "Answers riddles and writes new ones")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "riddler.toml", env = "RIDDLER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one question through the whole workflow
    Ask {
        /// Force a web search
        #[arg(long)]
        search: bool,
        /// Print the full JSON response
        #[arg(long)]
        json: bool,
        /// The question (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Drive a session one yield point at a time, printing each pause
    Step {
        #[arg(long)]
        search: bool,
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
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
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("riddler=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "riddler", &mut io::stdout());
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&redacted(&config))?);
        }
        Commands::Serve { bind } => {
            let mut config = load_config(&cli.config)?;
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            let workflow = build_workflow(&config)?;
            let server = riddler_gateway::GatewayServer::new(
                config.gateway.clone(),
                config.sessions.clone(),
                workflow,
            );

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Ask {
            search,
            json,
            question,
        } => {
            let workflow = build_workflow(&load_config(&cli.config)?)?;
            let output = workflow.run(workflow_input(question, search)?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output.value)?);
            } else {
                println!("{}", output.value["finalResponse"].as_str().unwrap_or_default());
            }
        }
        Commands::Step { search, question } => {
            let workflow = build_workflow(&load_config(&cli.config)?)?;
            step_through(workflow, workflow_input(question, search)?).await?;
        }
    }

    Ok(())
}

fn build_workflow(config: &AppConfig) -> anyhow::Result<Arc<Workflow>> {
    let workflow = riddle_workflow(Services::from_config(config.clone()))
        .context("failed to build the riddle workflow")?;
    Ok(Arc::new(workflow))
}

/// Joins CLI words into the workflow input, falling back to stdin.
fn workflow_input(words: Vec<String>, search: bool) -> anyhow::Result<Value> {
    let mut question = words.join(" ");
    if question.trim().is_empty() {
        question = io::stdin()
            .lock()
            .lines()
            .map_while(|l| l.ok())
            .collect::<Vec<_>>()
            .join("\n");
    }
    anyhow::ensure!(!question.trim().is_empty(), "Question is required");
    Ok(json!({ "question": question.trim(), "searchRequested": search }))
}

async fn step_through(workflow: Arc<Workflow>, input: Value) -> anyhow::Result<()> {
    let sessions = SessionManager::in_memory(workflow);
    let id = SessionId::new();

    let mut progress = sessions.start(input, &id).await?;
    loop {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        if !progress.can_continue {
            break;
        }
        let next = progress.next_step.clone();
        progress = sessions.continue_session(id.as_str(), next.as_deref()).await?;
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    let home_config = dirs_home().map(|h| h.join(".riddler").join("config.toml"));
    if let Some(path) = home_config.filter(|p| p.exists()) {
        info!(path = %path.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&path)?);
    }

    AppConfig::from_env().context("no config file found and RIDDLER_MODEL is not set")
}

/// Copy of the config with secrets masked, for display.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("***".into());
        }
    };
    mask(&mut shown.model.api_key);
    if let Some(creative) = shown.creative_model.as_mut() {
        mask(&mut creative.api_key);
    }
    if let Some(search) = shown.search.as_mut() {
        search.api_key = "***".into();
    }
    shown
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
