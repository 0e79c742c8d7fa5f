//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Device-trust session client
///
/// Creates or reuses a Verisoul session for this machine, submits device
/// evidence and prints the session id.
#[derive(Parser, Debug)]
#[command(name = "verisoul")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: <config dir>/verisoul/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment: dev, staging, sandbox or prod
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Project id (overrides config and VERISOUL_PROJECT_ID)
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a ready session id, collecting evidence first if needed
    Session,

    /// Replace the session with a fresh one and print its id
    Reinit,

    /// Show the persisted session record
    Status,

    /// Forget the persisted session
    Clear,
}
