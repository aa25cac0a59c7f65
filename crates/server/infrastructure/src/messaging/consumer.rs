//! Durable pull consumer loop
//!
//! Every delivered message is handed to a `MessageHandler` and acknowledged
//! once the handler returns. Redelivery only happens when the process dies
//! between the two, so handlers must tolerate replays.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::HeaderMap;
use dispatcher_server_domain::{InboundMessage, MessageHandler, MessagingError};
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::nats::{ensure_stream, stream_for_subject, STREAMS};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    /// Consumer group; members sharing it split the messages
    pub group: String,
    pub poll_timeout: Duration,
    pub ack_wait: Duration,
    pub max_deliver: i64,
}

impl ConsumerConfig {
    pub fn new(topic: impl Into<String>, group: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            poll_timeout,
            ack_wait: Duration::from_secs(30),
            max_deliver: 5,
        }
    }

    /// JetStream durable names may not contain subject tokens
    pub fn durable_name(&self) -> String {
        format!("{}-{}", self.group, self.topic)
            .chars()
            .map(|c| match c {
                '.' | '*' | '>' | ' ' => '-',
                other => other,
            })
            .collect()
    }
}

/// Flatten a JetStream message into the bus-agnostic shape
pub fn inbound_message(subject: &str, header_map: Option<&HeaderMap>, payload: &[u8]) -> InboundMessage {
    let headers = header_map
        .map(|map| {
            map.iter()
                .filter_map(|(name, values)| {
                    values
                        .first()
                        .map(|value| (name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    InboundMessage {
        topic: subject.to_string(),
        headers,
        payload: payload.to_vec(),
    }
}

pub struct NatsConsumer {
    jetstream: JetStreamContext,
    config: ConsumerConfig,
}

impl NatsConsumer {
    pub fn new(jetstream: JetStreamContext, config: ConsumerConfig) -> Self {
        Self { jetstream, config }
    }

    async fn pull_consumer(&self) -> Result<PullConsumer, MessagingError> {
        let stream_name = stream_for_subject(&self.config.topic).ok_or_else(|| {
            MessagingError::SubscribeError(format!(
                "topic {} is not covered by any of {:?}",
                self.config.topic,
                STREAMS.map(|(name, _)| name)
            ))
        })?;
        let subjects = STREAMS
            .iter()
            .find(|(name, _)| *name == stream_name)
            .map(|(_, subjects)| *subjects)
            .unwrap_or_default();

        let stream = ensure_stream(&self.jetstream, stream_name, subjects).await?;
        let durable_name = self.config.durable_name();

        if let Ok(consumer) = stream.get_consumer(&durable_name).await {
            debug!(consumer = %durable_name, "Consumer already exists");
            return Ok(consumer);
        }

        info!(consumer = %durable_name, stream = stream_name, "Creating consumer");

        stream
            .create_consumer(PullConsumerConfig {
                durable_name: Some(durable_name),
                filter_subject: self.config.topic.clone(),
                deliver_policy: DeliverPolicy::All,
                ack_policy: AckPolicy::Explicit,
                ack_wait: self.config.ack_wait,
                max_deliver: self.config.max_deliver,
                ..Default::default()
            })
            .await
            .map_err(|e| MessagingError::SubscribeError(e.to_string()))
    }

    /// Consume until `shutdown` fires or the message stream ends
    pub async fn run(
        &self,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), MessagingError> {
        let consumer = self.pull_consumer().await?;
        let mut messages = consumer
            .stream()
            .expires(self.config.poll_timeout)
            .messages()
            .await
            .map_err(|e| MessagingError::SubscribeError(e.to_string()))?;

        info!(topic = %self.config.topic, "Consumer started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(topic = %self.config.topic, "Consumer stopping");
                    break;
                }
                next = messages.next() => {
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            warn!(topic = %self.config.topic, error = %e, "Failed to pull message");
                            continue;
                        }
                        None => {
                            warn!(topic = %self.config.topic, "Message stream closed");
                            break;
                        }
                    };

                    let inbound = inbound_message(
                        message.subject.as_str(),
                        message.headers.as_ref(),
                        &message.payload,
                    );
                    handler.handle(inbound).await;

                    if let Err(e) = message.ack().await {
                        error!(topic = %self.config.topic, error = %e, "Failed to acknowledge message");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher_shared::event_topics::{headers, topics};

    #[test]
    fn test_durable_name_has_no_subject_tokens() {
        let config = ConsumerConfig::new(
            topics::VALIDATION_REQUEST,
            "playbook-dispatcher-validator",
            Duration::from_secs(1),
        );
        assert_eq!(
            config.durable_name(),
            "playbook-dispatcher-validator-platform-upload-announce"
        );
    }

    #[test]
    fn test_inbound_message_copies_headers() {
        let mut map = HeaderMap::new();
        map.insert(headers::CORRELATION_ID, "9200a0ba-1bc0-4b6a-a9d8-4a4b6c0bc1ad");
        map.insert(headers::REQUEST_TYPE, "playbook-sat");

        let inbound = inbound_message(topics::RUNNER_UPDATES, Some(&map), b"{\"events\":[]}");

        assert_eq!(inbound.topic, topics::RUNNER_UPDATES);
        assert_eq!(
            inbound.header(headers::CORRELATION_ID),
            Some("9200a0ba-1bc0-4b6a-a9d8-4a4b6c0bc1ad")
        );
        assert_eq!(inbound.header(headers::REQUEST_TYPE), Some("playbook-sat"));
        assert_eq!(inbound.payload, b"{\"events\":[]}".to_vec());
    }

    #[test]
    fn test_inbound_message_without_headers() {
        let inbound = inbound_message(topics::VALIDATION_REQUEST, None, b"{}");
        assert!(inbound.headers.is_empty());
    }
}
