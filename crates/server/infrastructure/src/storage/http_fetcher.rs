//! HTTP artifact fetcher
//!
//! Transport failures are retried up to the configured attempt count. Any
//! response carrying an HTTP status is final and its body is handed over as
//! is, so error pages fail validation downstream instead of vanishing.

use std::time::Duration;

use async_trait::async_trait;
use dispatcher_server_domain::{ArtifactFetcher, DomainError, Result};
use dispatcher_shared::config::StorageConfig;
use reqwest::Client;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: Client,
    timeout: Duration,
    attempts: u32,
}

impl HttpArtifactFetcher {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = Client::builder().build().map_err(|e| DomainError::Fetch {
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &StorageConfig) -> Self {
        Self {
            client,
            timeout: config.timeout(),
            attempts: config.retries.max(1),
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.client.get(url).timeout(self.timeout).send().await
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.attempt(url).await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        warn!(url, status = %status, "Artifact storage answered with an error status");
                    }

                    let body = response.bytes().await.map_err(|e| DomainError::Fetch {
                        message: format!("failed to read artifact body: {e}"),
                    })?;

                    debug!(url, size = body.len(), attempt, "Artifact fetched");
                    return Ok(body.to_vec());
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Artifact fetch attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(DomainError::Fetch {
            message: format!(
                "giving up on {} after {} attempts: {}",
                url,
                self.attempts,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        })
    }
}
