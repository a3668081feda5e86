//! Environment listing types

use serde::{Deserialize, Serialize};

/// Kind of runtime object an environment entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    Image,
    Container,
}

impl EnvironmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentKind::Image => "image",
            EnvironmentKind::Container => "container",
        }
    }
}

/// A built image or a running container derived from one.
///
/// Read-through projection of the container runtime's state at query time,
/// never cached. The runtime can change out-of-band between queries;
/// callers re-query rather than assume consistency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub kind: EnvironmentKind,
    pub name: String,
    pub id: String,
    /// Runtime-reported state (e.g. "Up 5 minutes"); containers only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Runtime-reported creation time, when it could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
