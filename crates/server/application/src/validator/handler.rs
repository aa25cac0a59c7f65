//! Validator pipeline
//!
//! intake (bus consumer) -> fetch pool -> validation worker
//!
//! Every stage is connected by a bounded channel so a slow validation worker
//! throttles fetching, which in turn throttles intake. Dropping the intake
//! handler closes the first channel and lets the later stages drain.

use std::sync::Arc;

use async_trait::async_trait;
use dispatcher_server_domain::{
    headers, ArtifactFetcher, DomainError, InboundMessage, IngressValidationRequest,
    IngressValidationResponse, MessageHandler, MessageProducer, OutboundMessage, RequestFlavor,
    RunUpdateMessage, TelemetryBatch, ValidationResult,
};
use dispatcher_shared::config::{StorageConfig, TopicsConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::content::{validate_content, ValidatedArtifact};
use super::fetch_pool::{FetchPool, FetchedArtifact};
use super::schema::SchemaValidator;
use super::stats::ValidatorStats;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub artifact_max_size: i64,
    pub fetch_workers: usize,
    pub channel_capacity: usize,
    pub response_topic: String,
    pub updates_topic: String,
}

impl ValidatorConfig {
    pub fn new(storage: &StorageConfig, topics: &TopicsConfig) -> Self {
        Self {
            artifact_max_size: storage.artifact_max_size,
            fetch_workers: storage.max_concurrency,
            channel_capacity: storage.channel_capacity,
            response_topic: topics.validation_response.clone(),
            updates_topic: topics.updates.clone(),
        }
    }
}

/// Running validator: the intake handler to plug into a bus consumer plus
/// the background stages
pub struct Validator {
    pub intake: Arc<ValidatorIntake>,
    pub stats: Arc<ValidatorStats>,
    stages: Vec<JoinHandle<()>>,
}

impl Validator {
    /// Build the pipeline and spawn the fetch pool and validation worker.
    ///
    /// Producer failures are reported on `errors`.
    pub fn start(
        config: ValidatorConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
        producer: Arc<dyn MessageProducer>,
        stats: Arc<ValidatorStats>,
        errors: mpsc::UnboundedSender<DomainError>,
    ) -> Result<Self, DomainError> {
        let schemas = SchemaValidator::new()?;
        let capacity = config.channel_capacity.max(1);

        let publisher = Publisher {
            producer,
            errors,
            response_topic: config.response_topic.clone(),
            updates_topic: config.updates_topic.clone(),
        };

        let (requests_tx, requests_rx) = mpsc::channel(capacity);
        let (fetched_tx, fetched_rx) = mpsc::channel(capacity);

        let pool = FetchPool::new(fetcher, stats.clone(), config.fetch_workers)
            .spawn(requests_rx, fetched_tx);

        let worker = ValidationWorker {
            schemas,
            publisher: publisher.clone(),
            stats: stats.clone(),
        };
        let validation = tokio::spawn(worker.run(fetched_rx));

        let intake = Arc::new(ValidatorIntake {
            requests: requests_tx,
            publisher,
            artifact_max_size: config.artifact_max_size,
        });

        info!(
            fetch_workers = config.fetch_workers,
            artifact_max_size = config.artifact_max_size,
            "🚀 Validator started"
        );

        Ok(Self {
            intake,
            stats,
            stages: vec![pool, validation],
        })
    }

    /// Close intake and wait for the pending uploads to be processed
    pub async fn drain(self) {
        drop(self.intake);
        for stage in self.stages {
            if let Err(e) = stage.await {
                error!(error = %e, "Validator stage panicked");
            }
        }
        let stats = self.stats.snapshot();
        info!(
            fetch_failures = stats.fetch_failures,
            validation_successes = stats.validation_successes,
            validation_failures = stats.validation_failures,
            "Validator stopped"
        );
    }
}

// ============================================================================
// Outbound messages
// ============================================================================

#[derive(Clone)]
struct Publisher {
    producer: Arc<dyn MessageProducer>,
    errors: mpsc::UnboundedSender<DomainError>,
    response_topic: String,
    updates_topic: String,
}

impl Publisher {
    async fn acknowledge(&self, request: &IngressValidationRequest, result: ValidationResult) {
        let response = IngressValidationResponse::new(request, result);
        match OutboundMessage::json(&self.response_topic, request.ack_key(), &response) {
            Ok(message) => self.produce(message).await,
            Err(e) => self.report(&self.response_topic, e.to_string()),
        }
    }

    async fn publish_update(&self, request: &IngressValidationRequest, artifact: ValidatedArtifact) {
        let key = artifact.correlation_id.to_string();
        let flavor = artifact.batch.flavor();

        let message = match artifact.batch {
            TelemetryBatch::Runner(events) => OutboundMessage::json(
                &self.updates_topic,
                key.clone(),
                &RunUpdateMessage::from_request(request, events),
            ),
            TelemetryBatch::Satellite(events) => OutboundMessage::json(
                &self.updates_topic,
                key.clone(),
                &RunUpdateMessage::from_request(request, events),
            ),
        };

        match message {
            Ok(message) => {
                let message = message
                    .with_header(headers::REQUEST_ID, &request.request_id)
                    .with_header(headers::CORRELATION_ID, key)
                    .with_header(headers::REQUEST_TYPE, flavor.as_str());
                self.produce(message).await;
            }
            Err(e) => self.report(&self.updates_topic, e.to_string()),
        }
    }

    async fn produce(&self, message: OutboundMessage) {
        let topic = message.topic.clone();
        if let Err(e) = self.producer.produce(message).await {
            self.report(&topic, e.to_string());
        }
    }

    fn report(&self, topic: &str, message: String) {
        error!(topic = %topic, error = %message, "Failed to produce message");
        let err = DomainError::Producer {
            topic: topic.to_string(),
            message,
        };
        if self.errors.send(err).is_err() {
            warn!("Process error channel closed");
        }
    }
}

// ============================================================================
// Stage A: intake
// ============================================================================

/// Consumes "artifact announced" messages
pub struct ValidatorIntake {
    requests: mpsc::Sender<IngressValidationRequest>,
    publisher: Publisher,
    artifact_max_size: i64,
}

#[async_trait]
impl MessageHandler for ValidatorIntake {
    async fn handle(&self, message: InboundMessage) {
        let request: IngressValidationRequest = match serde_json::from_slice(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Skipping unparsable upload announcement");
                return;
            }
        };

        debug!(
            request_id = %request.request_id,
            account = %request.account,
            org_id = %request.org_id,
            url = %request.url,
            "Processing request"
        );

        if request.size > self.artifact_max_size {
            warn!(
                request_id = %request.request_id,
                size = request.size,
                max = self.artifact_max_size,
                "Rejecting payload due to file size"
            );
            self.publisher
                .acknowledge(&request, ValidationResult::Failure)
                .await;
            return;
        }

        if self.requests.send(request).await.is_err() {
            warn!("Fetch pool is gone, dropping upload");
        }
    }
}

// ============================================================================
// Stage C: validation
// ============================================================================

struct ValidationWorker {
    schemas: SchemaValidator,
    publisher: Publisher,
    stats: Arc<ValidatorStats>,
}

impl ValidationWorker {
    async fn run(self, mut fetched: mpsc::Receiver<FetchedArtifact>) {
        while let Some(artifact) = fetched.recv().await {
            self.validate(artifact).await;
        }
        debug!("Validation worker stopped");
    }

    async fn validate(&self, artifact: FetchedArtifact) {
        let FetchedArtifact { request, data } = artifact;
        let flavor = RequestFlavor::from_upload(&request.service, &request.category);

        match validate_content(&self.schemas, flavor, &data) {
            Ok(validated) => {
                self.stats.record_success();
                info!(
                    request_id = %request.request_id,
                    correlation_id = %validated.correlation_id,
                    flavor = %flavor,
                    events = validated.batch.len(),
                    "✅ Upload validated"
                );
                self.publisher
                    .acknowledge(&request, ValidationResult::Success)
                    .await;
                self.publisher.publish_update(&request, validated).await;
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    request_id = %request.request_id,
                    flavor = %flavor,
                    error = %e,
                    "Upload failed validation"
                );
                debug!(data = %String::from_utf8_lossy(&data), "Invalid payload details");
                self.publisher
                    .acknowledge(&request, ValidationResult::Failure)
                    .await;
            }
        }
    }
}
