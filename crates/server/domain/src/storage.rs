use async_trait::async_trait;

use crate::shared_kernel::Result;

/// Retrieves uploaded telemetry artifacts
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Body of whatever the storage answered, still encoded. Only transport
    /// failures that outlast the retries are `Fetch` errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
