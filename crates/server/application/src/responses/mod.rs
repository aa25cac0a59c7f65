pub mod handler;
pub mod metrics;

pub use handler::ResponseConsumer;
pub use metrics::ResponseConsumerMetrics;
