//! Build domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::source::RepoSource;

/// One attempt to turn a source repository into a container image.
///
/// Snapshot of the canonical record owned by the registry, as serialized
/// to API callers. The captured log travels separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub name: String,
    pub source: RepoSource,
    pub limits: ResourceLimits,
    pub status: BuildStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Populated only when `status` is `Failed`.
    pub error: Option<String>,
}

/// Build lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Whether the build still occupies its name in the registry.
    pub fn is_active(&self) -> bool {
        matches!(self, BuildStatus::Queued | BuildStatus::Running)
    }

    /// Whether the build reached a final state. Terminal states are never
    /// left again.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
        }
    }
}

/// CPU/memory ceiling applied to the resulting environment.
///
/// Limits constrain the environment derived from the image, not the build
/// process; they are recorded as image labels and forwarded to the build
/// tool where it supports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling, e.g. "2G"
    pub memory: Option<String>,
    /// CPU ceiling, e.g. "2"
    pub cpu: Option<String>,
}

impl ResourceLimits {
    pub fn is_unlimited(&self) -> bool {
        self.memory.is_none() && self.cpu.is_none()
    }
}
