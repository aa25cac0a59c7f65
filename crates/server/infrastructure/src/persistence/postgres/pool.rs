//! PostgreSQL connection pool
//!
//! One pool is created in `main` and shared by every repository.

use dispatcher_shared::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PoolError> {
        info!(
            max = config.max_open_connections,
            min = config.max_idle_connections,
            timeout = ?config.connect_timeout(),
            "Creating PostgreSQL pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_connections)
            .min_connections(config.max_idle_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    #[inline]
    pub fn pg_pool(&self) -> PgPool {
        self.pool.clone()
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),
}
