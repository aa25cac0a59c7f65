pub mod migrations;
pub mod pool;
pub mod run_repository;

pub use migrations::{MigrationError, MigrationService};
pub use pool::{DatabasePool, PoolError};
pub use run_repository::PostgresRunRepository;
