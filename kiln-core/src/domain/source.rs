//! Source repository reference

use serde::{Deserialize, Serialize};

/// Location and revision of the repository to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    /// Repository URL (http, https or git scheme)
    pub repository: String,
    /// Revision to check out: branch, tag or commit
    #[serde(default = "default_reference")]
    pub reference: String,
}

fn default_reference() -> String {
    "HEAD".to_string()
}

impl RepoSource {
    pub fn new(repository: impl Into<String>, reference: Option<String>) -> Self {
        Self {
            repository: repository.into(),
            reference: reference.unwrap_or_else(default_reference),
        }
    }
}
