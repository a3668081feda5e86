//! Build log types

use serde::{Deserialize, Serialize};

/// A single captured line of build output.
///
/// `number` is the zero-based position in the build's log, assigned in
/// capture order and stable for the lifetime of the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub number: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
}
