//! Environment command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use kiln_client::KilnClient;
use kiln_core::domain::environment::EnvironmentKind;

use crate::config::Config;

/// Environment subcommands
#[derive(Subcommand)]
pub enum EnvCommands {
    /// List built images and running containers
    List,
    /// Remove a built image by reference (name:tag)
    Remove {
        /// Image reference
        reference: String,
    },
}

/// Handle environment commands
pub async fn handle_env_command(command: EnvCommands, config: &Config) -> Result<()> {
    let client = KilnClient::new(&config.server_url);

    match command {
        EnvCommands::List => list_environments(&client).await,
        EnvCommands::Remove { reference } => remove_environment(&client, &reference).await,
    }
}

async fn list_environments(client: &KilnClient) -> Result<()> {
    let environments = client.list_environments().await?;

    if environments.is_empty() {
        println!("{}", "No environments found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} environment(s):", environments.len()).bold());
    println!();
    for entry in environments {
        let kind = match entry.kind {
            EnvironmentKind::Image => entry.kind.as_str().blue(),
            EnvironmentKind::Container => entry.kind.as_str().green(),
        };
        let status = entry.status.map(|s| format!(" ({})", s)).unwrap_or_default();
        println!("  [{}] {} {}{}", kind, entry.name.bold(), entry.id, status);
    }

    Ok(())
}

async fn remove_environment(client: &KilnClient, reference: &str) -> Result<()> {
    match client.remove_environment(reference).await {
        Ok(()) => {
            println!("Image {} {}", reference.bold(), "removed".green());
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{}", format!("No such image: {}", reference).yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
