//! Kiln HTTP Client
//!
//! A simple, type-safe HTTP client for the Kiln server API.
//!
//! # Example
//!
//! ```no_run
//! use kiln_client::KilnClient;
//! use kiln_core::dto::build::StartBuild;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = KilnClient::new("http://localhost:6789");
//!
//!     let created = client.start_build(StartBuild {
//!         name: "course-env".to_string(),
//!         repository: "https://example.com/x.git".to_string(),
//!         reference: None,
//!         memory: None,
//!         cpu: None,
//!     }).await?;
//!
//!     println!("Started build: {}", created.name);
//!     Ok(())
//! }
//! ```

pub mod error;
mod builds;
mod environments;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Kiln server API
///
/// Methods cover all server endpoints, organized into logical groups:
/// - Build lifecycle (start, status/log polling, cancel)
/// - Environment inventory (list, remove)
#[derive(Debug, Clone)]
pub struct KilnClient {
    /// Base URL of the server (e.g., "http://localhost:6789")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl KilnClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new client with a custom HTTP client, e.g. to configure
    /// timeouts or proxies.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON, mapping non-success
    /// status codes to typed errors.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = KilnClient::new("http://localhost:6789");
        assert_eq!(client.base_url(), "http://localhost:6789");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = KilnClient::new("http://localhost:6789/");
        assert_eq!(client.base_url(), "http://localhost:6789");
    }

    #[test]
    fn test_error_classification() {
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(ClientError::api_error(409, "busy").is_conflict());
        assert!(ClientError::api_error(503, "runtime down").is_retryable());
        assert!(!ClientError::api_error(500, "boom").is_conflict());
    }
}
