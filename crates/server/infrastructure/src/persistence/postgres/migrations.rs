//! Database migration service
//!
//! SQL migrations live in `migrations/` next to this crate's manifest and are
//! embedded into the binary at build time.
//!
//! ```ignore
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! MigrationService::new(pool).run_all().await?;
//! ```

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPool;
use thiserror::Error;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

pub struct MigrationService {
    pool: PgPool,
}

impl MigrationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every pending migration
    pub async fn run_all(&self) -> Result<usize, MigrationError> {
        let known = MIGRATOR.iter().count();
        info!(migrations = known, "Applying database migrations");

        MIGRATOR.run(&self.pool).await?;

        info!("✅ Database schema is up to date");
        Ok(known)
    }
}
