//! Build-related API endpoints

use kiln_core::domain::build::Build;
use kiln_core::dto::build::{BuildCreated, BuildStatusResponse, CancelResponse, StartBuild};

use crate::KilnClient;
use crate::error::Result;

impl KilnClient {
    /// Start a new build
    ///
    /// Returns the accepted record's identity, or a 409 `ApiError` when a
    /// build with the same name is already in progress (check with
    /// [`crate::ClientError::is_conflict`]).
    pub async fn start_build(&self, req: StartBuild) -> Result<BuildCreated> {
        let url = format!("{}/api/builds", self.base_url);
        tracing::debug!("starting build {} from {}", req.name, req.repository);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a build's status plus its log
    ///
    /// With `since_line`, only log lines numbered `since_line` and later
    /// are returned; pass the previous response's `next_line` to poll
    /// incrementally.
    pub async fn get_build(
        &self,
        name: &str,
        since_line: Option<usize>,
    ) -> Result<BuildStatusResponse> {
        let url = format!("{}/api/builds/{}", self.base_url, name);
        let mut request = self.client.get(&url);
        if let Some(since) = since_line {
            request = request.query(&[("since_line", since)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// List all known builds, most recent first
    pub async fn list_builds(&self) -> Result<Vec<Build>> {
        let url = format!("{}/api/builds", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a build by name
    ///
    /// `cancelled` in the response tells whether an active build was found
    /// and is now being stopped.
    pub async fn cancel_build(&self, name: &str) -> Result<CancelResponse> {
        let url = format!("{}/api/builds/{}/cancel", self.base_url, name);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }
}
