//! Fetch worker pool
//!
//! N workers pull accepted uploads from a shared bounded channel, download
//! the artifact and forward the bytes to the validation stage. The output
//! channel closes once every worker has exited.

use std::sync::Arc;

use dispatcher_server_domain::{ArtifactFetcher, IngressValidationRequest};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::stats::ValidatorStats;

/// Downloaded artifact waiting for validation
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub request: IngressValidationRequest,
    pub data: Vec<u8>,
}

pub struct FetchPool {
    fetcher: Arc<dyn ArtifactFetcher>,
    stats: Arc<ValidatorStats>,
    workers: usize,
}

impl FetchPool {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, stats: Arc<ValidatorStats>, workers: usize) -> Self {
        Self {
            fetcher,
            stats,
            workers: workers.max(1),
        }
    }

    /// Start the workers. The returned task completes when `input` is closed
    /// and drained.
    pub fn spawn(
        self,
        input: mpsc::Receiver<IngressValidationRequest>,
        output: mpsc::Sender<FetchedArtifact>,
    ) -> JoinHandle<()> {
        let input = Arc::new(Mutex::new(input));
        let mut workers = JoinSet::new();

        for worker in 0..self.workers {
            let input = input.clone();
            let output = output.clone();
            let fetcher = self.fetcher.clone();
            let stats = self.stats.clone();

            workers.spawn(async move {
                loop {
                    let next = input.lock().await.recv().await;
                    let Some(request) = next else {
                        break;
                    };

                    match fetcher.fetch(&request.url).await {
                        Ok(data) => {
                            debug!(worker, url = %request.url, bytes = data.len(), "Artifact fetched");
                            if output.send(FetchedArtifact { request, data }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            stats.record_fetch_failure();
                            warn!(
                                worker,
                                request_id = %request.request_id,
                                url = %request.url,
                                error = %e,
                                "Dropping upload: artifact could not be fetched"
                            );
                        }
                    }
                }
                debug!(worker, "Fetch worker stopped");
            });
        }

        drop(output);

        tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Fetch worker panicked");
                }
            }
        })
    }
}
