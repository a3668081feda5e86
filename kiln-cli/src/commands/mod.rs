//! CLI commands
//!
//! Each submodule handles one command group.

pub mod build;
pub mod environment;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage builds
    #[command(subcommand)]
    Build(build::BuildCommands),
    /// Inspect environments (built images and running containers)
    #[command(subcommand)]
    Env(environment::EnvCommands),
}

/// Route a command to its handler
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Build(cmd) => build::handle_build_command(cmd, config).await,
        Commands::Env(cmd) => environment::handle_env_command(cmd, config).await,
    }
}
