//! `verisoul` - device-trust session client
//!
//! Composition root: loads configuration, wires the concrete collaborators
//! into a [`SessionOrchestrator`] and runs one command.

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::Style;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use verisoul_core::session::KeyValueStore;
use verisoul_core::{ClientConfig, FileStore, MemoryStore, SessionOrchestrator, SessionRegistry};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = open_store(&config);

    match cli.command {
        Commands::Status => show_status(&SessionRegistry::new(store))?,
        Commands::Clear => {
            SessionRegistry::new(store).clear();
            println!("{}", Style::new().green().apply_to("Session cleared"));
        }
        Commands::Session => {
            let session_id = run_session(config, store, false).await?;
            println!("{}", session_id);
        }
        Commands::Reinit => {
            let session_id = run_session(config, store, true).await?;
            println!("{}", session_id);
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ClientConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => ClientConfig::load_or_default(),
    };

    if let Some(env) = &cli.env {
        config.environment = env.clone();
    }
    if let Some(project) = &cli.project {
        config.project_id = project.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &ClientConfig) -> Arc<dyn KeyValueStore> {
    match config.storage.resolved_path() {
        Some(path) => Arc::new(FileStore::new(path)),
        None => {
            warn!("No data directory available, session will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run_session(config: ClientConfig, store: Arc<dyn KeyValueStore>, reinitialize: bool) -> Result<String> {
    if config.project_id.is_empty() {
        bail!("No project id: pass --project or set VERISOUL_PROJECT_ID");
    }
    let env = config.environment()?;
    let project_id = config.project_id.clone();

    let orchestrator = SessionOrchestrator::builder()
        .with_config(config)
        .with_store(store)
        .build()
        .context("Failed to set up the session client")?;

    orchestrator.configure(env, &project_id, reinitialize);

    let result = orchestrator.session().await;
    orchestrator.shutdown();
    Ok(result?)
}

fn show_status(registry: &SessionRegistry) -> Result<()> {
    let Some(record) = registry.get_session() else {
        println!("{}", Style::new().yellow().apply_to("No session"));
        return Ok(());
    };

    let state = if record.is_ready() {
        Style::new().green().apply_to("ready")
    } else if record.is_expired() {
        Style::new().red().apply_to("expired")
    } else {
        Style::new().yellow().apply_to("pending")
    };
    println!("Session {} ({})", record.session_id, state);
    println!("{}", record.to_json().context("Failed to encode session record")?);
    Ok(())
}
