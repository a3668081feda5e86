//! Build command handlers
//!
//! Handles starting builds, listing them, polling status, following logs
//! and cancellation.

use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use kiln_client::KilnClient;
use kiln_core::domain::build::{Build, BuildStatus};
use kiln_core::dto::build::StartBuild;

use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Build subcommands
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Start a new build
    Start {
        /// Target image name
        name: String,
        /// Repository URL to build
        repository: String,
        /// Revision to check out (defaults to HEAD)
        #[arg(long = "ref")]
        reference: Option<String>,
        /// Memory ceiling for the environment, e.g. 2G
        #[arg(long)]
        memory: Option<String>,
        /// CPU ceiling for the environment, e.g. 2
        #[arg(long)]
        cpu: Option<String>,
        /// Follow the build log until it finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// List all builds
    List,
    /// Get build status
    Status {
        /// Build name
        name: String,
    },
    /// Show build logs
    Logs {
        /// Build name
        name: String,
        /// Keep polling until the build finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Cancel an active build
    Cancel {
        /// Build name
        name: String,
    },
}

/// Handle build commands
pub async fn handle_build_command(command: BuildCommands, config: &Config) -> Result<()> {
    let client = KilnClient::new(&config.server_url);

    match command {
        BuildCommands::Start {
            name,
            repository,
            reference,
            memory,
            cpu,
            follow,
        } => {
            start_build(&client, name, repository, reference, memory, cpu, follow).await
        }
        BuildCommands::List => list_builds(&client).await,
        BuildCommands::Status { name } => show_status(&client, &name).await,
        BuildCommands::Logs { name, follow } => show_logs(&client, &name, follow).await,
        BuildCommands::Cancel { name } => cancel_build(&client, &name).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn start_build(
    client: &KilnClient,
    name: String,
    repository: String,
    reference: Option<String>,
    memory: Option<String>,
    cpu: Option<String>,
    follow: bool,
) -> Result<()> {
    let created = match client
        .start_build(StartBuild {
            name: name.clone(),
            repository,
            reference,
            memory,
            cpu,
        })
        .await
    {
        Ok(created) => created,
        Err(e) if e.is_conflict() => {
            println!("{}", format!("A build named '{}' is already in progress.", name).yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "Build {} {} ({})",
        created.name.bold(),
        "started".green(),
        created.id
    );

    if follow {
        follow_logs(client, &name).await?;
    }

    Ok(())
}

async fn list_builds(client: &KilnClient) -> Result<()> {
    let builds = client.list_builds().await?;

    if builds.is_empty() {
        println!("{}", "No builds found.".yellow());
    } else {
        println!("{}", format!("Found {} build(s):", builds.len()).bold());
        println!();
        for build in builds {
            print_build_summary(&build);
        }
    }

    Ok(())
}

async fn show_status(client: &KilnClient, name: &str) -> Result<()> {
    let response = client.get_build(name, None).await?;
    let build = response.build;

    println!("{}: {}", "Name".bold(), build.name);
    println!("{}: {}", "Status".bold(), colorize_status(build.status));
    println!("{}: {}", "Repository".bold(), build.source.repository);
    println!("{}: {}", "Revision".bold(), build.source.reference);
    println!("{}: {}", "Started".bold(), build.started_at);
    if let Some(finished_at) = build.finished_at {
        println!("{}: {}", "Finished".bold(), finished_at);
    }
    if let Some(error) = build.error {
        println!("{}: {}", "Error".bold(), error.red());
    }
    println!("{}: {} line(s)", "Log".bold(), response.next_line);

    Ok(())
}

async fn show_logs(client: &KilnClient, name: &str, follow: bool) -> Result<()> {
    if follow {
        return follow_logs(client, name).await;
    }

    let response = client.get_build(name, None).await?;
    for line in response.log {
        println!("{}", line.message);
    }
    print_terminal_status(&response.build);

    Ok(())
}

/// Poll the incremental log endpoint until the build reaches a terminal
/// state, printing new lines as they arrive.
async fn follow_logs(client: &KilnClient, name: &str) -> Result<()> {
    let mut since = 0;

    loop {
        let response = client.get_build(name, Some(since)).await?;

        for line in &response.log {
            println!("{}", line.message);
        }
        since = response.next_line;

        if response.build.status.is_terminal() {
            print_terminal_status(&response.build);
            if response.build.status == BuildStatus::Failed {
                anyhow::bail!(
                    "build failed: {}",
                    response.build.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            return Ok(());
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn cancel_build(client: &KilnClient, name: &str) -> Result<()> {
    let response = client.cancel_build(name).await?;

    if response.cancelled {
        println!("Build {} {}", response.name.bold(), "cancelling".yellow());
    } else {
        println!(
            "{}",
            format!("Build {} already finished; nothing to cancel.", response.name).yellow()
        );
    }

    Ok(())
}

fn print_build_summary(build: &Build) {
    println!(
        "  {} [{}] {} @ {}",
        build.name.bold(),
        colorize_status(build.status),
        build.source.repository,
        build.source.reference
    );
}

fn print_terminal_status(build: &Build) {
    if build.status.is_terminal() {
        println!();
        println!("Build {}: {}", build.name.bold(), colorize_status(build.status));
    }
}

fn colorize_status(status: BuildStatus) -> ColoredString {
    match status {
        BuildStatus::Queued => status.as_str().yellow(),
        BuildStatus::Running => status.as_str().cyan(),
        BuildStatus::Succeeded => status.as_str().green(),
        BuildStatus::Failed => status.as_str().red(),
        BuildStatus::Cancelled => status.as_str().magenta(),
    }
}
