//! JetStream implementation of the `MessageProducer` port

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use dispatcher_server_domain::{MessageProducer, MessagingError, OutboundMessage};
use dispatcher_shared::event_topics::headers;
use tracing::{debug, instrument};

/// The message key travels as a header; JetStream has no partition key
pub fn outbound_headers(message: &OutboundMessage) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(headers::MESSAGE_KEY, message.key.as_str());
    for (name, value) in &message.headers {
        map.insert(name.as_str(), value.as_str());
    }
    map
}

#[derive(Clone)]
pub struct NatsProducer {
    jetstream: JetStreamContext,
}

impl NatsProducer {
    pub fn new(jetstream: JetStreamContext) -> Self {
        Self { jetstream }
    }
}

#[async_trait]
impl MessageProducer for NatsProducer {
    /// Resolves once the stream has stored the message
    #[instrument(skip(self, message), fields(topic = %message.topic, key = %message.key))]
    async fn produce(&self, message: OutboundMessage) -> Result<(), MessagingError> {
        let header_map = outbound_headers(&message);

        let ack = self
            .jetstream
            .publish_with_headers(message.topic.clone(), header_map, Bytes::from(message.payload))
            .await
            .map_err(|e| MessagingError::PublishError(e.to_string()))?;

        ack.await
            .map_err(|e| MessagingError::PublishError(e.to_string()))?;

        debug!("Message stored");
        Ok(())
    }
}
