//! Telemetry validator: intake, fetch pool and validation worker

pub mod content;
pub mod fetch_pool;
pub mod handler;
pub mod schema;
pub mod stats;

pub use content::{validate_content, ValidatedArtifact};
pub use handler::{Validator, ValidatorConfig, ValidatorIntake};
pub use schema::SchemaValidator;
pub use stats::{ValidatorStats, ValidatorStatsSnapshot};
