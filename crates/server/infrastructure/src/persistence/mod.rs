pub mod postgres;

pub use postgres::{DatabasePool, MigrationService, PostgresRunRepository};
