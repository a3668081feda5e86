//! Build DTOs for the HTTP API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::build::{Build, BuildStatus};
use crate::domain::log::LogLine;

/// Request to start a new build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBuild {
    /// Target image name; the unit of mutual exclusion
    pub name: String,
    /// Repository URL to build
    pub repository: String,
    /// Revision to check out (defaults to HEAD)
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Memory ceiling for the resulting environment, e.g. "2G"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// CPU ceiling for the resulting environment, e.g. "2"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

/// Response to an accepted build request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCreated {
    pub id: Uuid,
    pub name: String,
    pub status: BuildStatus,
}

/// Query parameters for incremental status/log polling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Return only log lines numbered `since_line` and later
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_line: Option<usize>,
}

/// Status plus full or incremental log for one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatusResponse {
    pub build: Build,
    pub log: Vec<LogLine>,
    /// Pass back as `since_line` to continue where this response left off
    pub next_line: usize,
}

/// Outcome of a cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub name: String,
    /// Whether an active build was found and is now being cancelled
    pub cancelled: bool,
}
