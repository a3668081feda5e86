//! Environment-related API endpoints

use kiln_core::domain::environment::EnvironmentEntry;

use crate::KilnClient;
use crate::error::Result;

impl KilnClient {
    /// List built images and running containers derived from them
    pub async fn list_environments(&self) -> Result<Vec<EnvironmentEntry>> {
        let url = format!("{}/api/environments", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Remove a built image by reference (`name:tag`)
    pub async fn remove_environment(&self, reference: &str) -> Result<()> {
        let url = format!("{}/api/environments/{}", self.base_url, reference);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
