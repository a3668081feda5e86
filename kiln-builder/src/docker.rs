//! Container runtime queries
//!
//! Shells out to the docker CLI to list images and containers carrying the
//! kiln label and to remove built images. Every call reflects the runtime's
//! state at call time; nothing is cached, and an unreachable runtime is a
//! typed error rather than an empty listing.

use std::ffi::OsStr;
use std::process::Output;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use kiln_core::domain::{EnvironmentEntry, EnvironmentKind};

use crate::error::{Result, RuntimeError};
use crate::repo2docker::ENVIRONMENT_LABEL;

/// Client for the container runtime's query surface.
#[derive(Debug, Clone)]
pub struct DockerClient {
    binary: String,
}

impl DockerClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe that the runtime binary is present and answering.
    pub async fn check_available(&self) -> Result<String> {
        let output = self.run(["--version"]).await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("container runtime available: {}", version);
        Ok(version)
    }

    /// List images built by this service.
    pub async fn list_images(&self) -> Result<Vec<EnvironmentEntry>> {
        let label_filter = format!("label={}", ENVIRONMENT_LABEL);
        let output = self
            .run([
                "images",
                "--filter",
                label_filter.as_str(),
                "--format",
                "{{json .}}",
            ])
            .await?;

        let rows: Vec<ImageRow> = parse_rows(&output.stdout)?;
        debug!("runtime reports {} image(s)", rows.len());
        Ok(rows.into_iter().map(ImageRow::into_entry).collect())
    }

    /// List running containers started from images built by this service.
    pub async fn list_containers(&self) -> Result<Vec<EnvironmentEntry>> {
        let label_filter = format!("label={}", ENVIRONMENT_LABEL);
        let output = self
            .run([
                "ps",
                "--filter",
                label_filter.as_str(),
                "--format",
                "{{json .}}",
            ])
            .await?;

        let rows: Vec<ContainerRow> = parse_rows(&output.stdout)?;
        debug!("runtime reports {} container(s)", rows.len());
        Ok(rows.into_iter().map(ContainerRow::into_entry).collect())
    }

    /// Remove a built image by reference (`name:tag`).
    pub async fn remove_image(&self, reference: &str) -> Result<()> {
        match self.run(["rmi", reference]).await {
            Ok(_) => {
                info!("removed image {}", reference);
                Ok(())
            }
            Err(RuntimeError::CommandFailed { stderr, .. })
                if stderr.to_lowercase().contains("no such image") =>
            {
                Err(RuntimeError::NotFound(reference.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(RuntimeError::Unavailable)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RuntimeError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(output)
    }
}

/// One line of `docker images --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct ImageRow {
    #[serde(rename = "Repository")]
    repository: String,
    #[serde(rename = "Tag")]
    tag: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
}

impl ImageRow {
    fn into_entry(self) -> EnvironmentEntry {
        EnvironmentEntry {
            kind: EnvironmentKind::Image,
            name: format!("{}:{}", self.repository, self.tag),
            id: self.id,
            status: None,
            created_at: parse_runtime_time(&self.created_at),
        }
    }
}

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct ContainerRow {
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
}

impl ContainerRow {
    fn into_entry(self) -> EnvironmentEntry {
        EnvironmentEntry {
            kind: EnvironmentKind::Container,
            name: self.names,
            id: self.id,
            status: Some(self.status),
            created_at: parse_runtime_time(&self.created_at),
        }
    }
}

fn parse_rows<T: for<'de> Deserialize<'de>>(stdout: &[u8]) -> Result<Vec<T>> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(RuntimeError::from))
        .collect()
}

/// Parse the CLI's local-formatted timestamp, e.g.
/// `2024-03-01 10:21:33 +0100 CET`. The trailing zone name is redundant
/// with the offset and dropped; unparseable values become `None`.
fn parse_runtime_time(raw: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = raw.split_whitespace().take(3).collect();
    if fields.len() < 3 {
        return None;
    }
    DateTime::parse_from_str(&fields.join(" "), "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_image_rows() {
        let stdout = concat!(
            r#"{"Repository":"course-env","Tag":"HEAD","ID":"f2a9b1c4d5e6","CreatedAt":"2024-03-01 10:21:33 +0000 UTC"}"#,
            "\n",
            r#"{"Repository":"intro-py","Tag":"main","ID":"0a1b2c3d4e5f","CreatedAt":"2024-02-28 08:00:00 +0100 CET"}"#,
            "\n",
        );

        let rows: Vec<ImageRow> = parse_rows(stdout.as_bytes()).unwrap();
        let entries: Vec<EnvironmentEntry> = rows.into_iter().map(ImageRow::into_entry).collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EnvironmentKind::Image);
        assert_eq!(entries[0].name, "course-env:HEAD");
        assert_eq!(entries[0].id, "f2a9b1c4d5e6");
        assert!(entries[0].status.is_none());
        assert_eq!(entries[1].created_at.unwrap().hour(), 7);
    }

    #[test]
    fn parses_container_rows() {
        let stdout = r#"{"Names":"course-env-instance","ID":"abc123","Status":"Up 5 minutes","CreatedAt":"2024-03-01 10:30:00 +0000 UTC"}"#;

        let rows: Vec<ContainerRow> = parse_rows(stdout.as_bytes()).unwrap();
        let entry = rows.into_iter().next().unwrap().into_entry();

        assert_eq!(entry.kind, EnvironmentKind::Container);
        assert_eq!(entry.name, "course-env-instance");
        assert_eq!(entry.status.as_deref(), Some("Up 5 minutes"));
        assert!(entry.created_at.is_some());
    }

    #[test]
    fn empty_output_is_empty_listing() {
        let rows: Vec<ImageRow> = parse_rows(b"\n\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn malformed_output_is_a_parse_error() {
        let result: Result<Vec<ImageRow>> = parse_rows(b"not-json");
        assert!(matches!(result, Err(RuntimeError::Parse(_))));
    }

    #[test]
    fn unparseable_time_is_none() {
        assert!(parse_runtime_time("").is_none());
        assert!(parse_runtime_time("yesterday").is_none());
        assert!(parse_runtime_time("2024-03-01 10:21:33 +0000 UTC").is_some());
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let client = DockerClient::new("/nonexistent/kiln-docker");
        let err = client.check_available().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn failing_binary_is_command_failed() {
        let client = DockerClient::new("false");
        let err = client.check_available().await.unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed { .. }));
        assert!(!err.is_retryable());
    }
}
