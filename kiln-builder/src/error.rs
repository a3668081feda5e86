//! Error types for container runtime operations

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors from the container runtime query surface
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be executed at all. Retryable; never
    /// reported as an empty listing.
    #[error("container runtime unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    /// The runtime ran but reported an error
    #[error("runtime command failed (exit {code}): {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The runtime's output could not be interpreted
    #[error("failed to parse runtime output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The named runtime object does not exist
    #[error("no such object: {0}")]
    NotFound(String),
}

impl RuntimeError {
    /// Whether the caller should retry later rather than treat this as a
    /// definitive answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RuntimeError::Unavailable(_))
    }
}
