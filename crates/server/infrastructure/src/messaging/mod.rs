//! Message bus binding (NATS JetStream)

pub mod consumer;
pub mod nats;
pub mod producer;

pub use consumer::{ConsumerConfig, NatsConsumer};
pub use nats::NatsConnection;
pub use producer::NatsProducer;
