//! NATS JetStream connection and stream bootstrap.
//!
//! Topics are JetStream subjects. The upload pipeline subjects and the
//! dispatcher's own subjects live in two file-backed streams that are
//! created on startup when missing.

use async_nats::jetstream::stream::{Config as StreamConfig, Stream as StreamHandle, StorageType};
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::{Client, ConnectOptions};
use dispatcher_server_domain::MessagingError;
use dispatcher_shared::config::NatsConfig;
use dispatcher_shared::event_topics::streams;
use tracing::{debug, info};

/// Streams owned by the dispatcher: `(name, subjects)`
pub const STREAMS: [(&str, &str); 2] = [
    (streams::UPLOAD_STREAM_NAME, streams::UPLOAD_SUBJECTS),
    (streams::DISPATCHER_STREAM_NAME, streams::DISPATCHER_SUBJECTS),
];

/// Name of the stream that captures `subject`
pub fn stream_for_subject(subject: &str) -> Option<&'static str> {
    STREAMS.iter().find_map(|(name, pattern)| {
        let prefix = pattern.trim_end_matches('>');
        subject.starts_with(prefix).then_some(*name)
    })
}

/// Connected client plus its JetStream context
#[derive(Clone)]
pub struct NatsConnection {
    client: Client,
    jetstream: JetStreamContext,
}

impl NatsConnection {
    pub async fn connect(config: &NatsConfig) -> Result<Self, MessagingError> {
        let connect_options = ConnectOptions::default()
            .name("playbook-dispatcher")
            .connection_timeout(std::time::Duration::from_secs(config.connect_timeout_secs));

        let client = async_nats::connect_with_options(config.url.as_str(), connect_options)
            .await
            .map_err(|e| MessagingError::ConnectionError(e.to_string()))?;

        info!(url = %config.url, "Connected to NATS");

        let jetstream = async_nats::jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Create every stream the dispatcher reads from or writes to
    pub async fn ensure_streams(&self) -> Result<(), MessagingError> {
        for (name, subjects) in STREAMS {
            ensure_stream(&self.jetstream, name, subjects).await?;
        }
        Ok(())
    }

    /// Flush pending publishes before the process exits
    pub async fn close(&self) -> Result<(), MessagingError> {
        self.client
            .flush()
            .await
            .map_err(|e| MessagingError::ConnectionError(e.to_string()))
    }
}

/// Look up a stream, creating it with file storage when absent
pub async fn ensure_stream(
    jetstream: &JetStreamContext,
    name: &str,
    subjects: &str,
) -> Result<StreamHandle, MessagingError> {
    if let Ok(stream) = jetstream.get_stream(name).await {
        debug!(stream = name, "Stream already exists");
        return Ok(stream);
    }

    info!(stream = name, subjects, "Creating stream");

    jetstream
        .create_stream(StreamConfig {
            name: name.to_string(),
            subjects: vec![subjects.to_string()],
            storage: StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| MessagingError::ConnectionError(e.to_string()))
}
