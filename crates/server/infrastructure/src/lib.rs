// Playbook Dispatcher - Infrastructure Layer
// Adapters for the domain ports, grouped by technology:
// - persistence: PostgreSQL run store (sqlx)
// - messaging: NATS JetStream producer and consumer loop
// - connectors: cloud connector HTTP client
// - storage: artifact fetcher
// - observability: tracing subscriber

pub mod connectors;
pub mod messaging;
pub mod observability;
pub mod persistence;
pub mod storage;

pub use connectors::CloudConnectorClient;
pub use messaging::{ConsumerConfig, NatsConnection, NatsConsumer, NatsProducer};
pub use observability::{init_tracing, TracingConfig};
pub use persistence::postgres::{DatabasePool, MigrationService, PostgresRunRepository};
pub use storage::HttpArtifactFetcher;
