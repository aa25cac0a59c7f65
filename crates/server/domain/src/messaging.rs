use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Failed to publish message: {0}")]
    PublishError(String),
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Message to produce on a topic
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn json<T: serde::Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, MessagingError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| MessagingError::SerializationError(e.to_string()))?;

        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            headers: Vec::new(),
            payload,
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Message delivered by a bus consumer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub headers: HashMap<String, String>,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Publishes messages to the bus
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn produce(&self, message: OutboundMessage) -> Result<(), MessagingError>;
}

/// Handles one consumed message. Errors are logged by the handler itself;
/// the consumer acknowledges the message once this returns.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage);
}

impl From<MessagingError> for crate::shared_kernel::DomainError {
    fn from(err: MessagingError) -> Self {
        crate::shared_kernel::DomainError::InvalidMessage {
            message: err.to_string(),
        }
    }
}
