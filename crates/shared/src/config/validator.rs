//! Configuration validation

use super::dto::DispatcherConfigDto;
use super::error::{ConfigError, Result};

/// Validate a database URL format
pub fn validate_database_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ConfigError::InvalidDatabaseUrl(
            "Database URL cannot be empty".to_string(),
        ));
    }

    if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
        return Err(ConfigError::InvalidDatabaseUrl(format!(
            "Database URL must start with postgres:// or postgresql://, got: {}",
            url
        )));
    }

    Ok(())
}

/// Validate a NATS URL format
pub fn validate_nats_url(url: &str) -> Result<()> {
    let valid = ["nats://", "tls://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme));

    if !valid {
        return Err(ConfigError::InvalidUrl(format!(
            "NATS URL must use nats://, tls://, ws:// or wss://, got: {}",
            url
        )));
    }

    Ok(())
}

/// Validate the full dispatcher configuration
pub fn validate_dispatcher_config(config: &DispatcherConfigDto) -> Result<()> {
    validate_database_url(&config.database.url)?;
    validate_nats_url(&config.nats.url)?;

    if config.database.max_open_connections == 0 {
        return Err(ConfigError::Validation(
            "database max open connections must be > 0".to_string(),
        ));
    }

    if config.database.max_idle_connections > config.database.max_open_connections {
        return Err(ConfigError::Validation(format!(
            "database max idle connections ({}) cannot exceed max open connections ({})",
            config.database.max_idle_connections, config.database.max_open_connections
        )));
    }

    if config.cloud_connector.rps == 0 || config.cloud_connector.req_bucket == 0 {
        return Err(ConfigError::Validation(
            "cloud connector rps and request bucket must be > 0".to_string(),
        ));
    }

    if config.storage.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "storage max concurrency must be > 0".to_string(),
        ));
    }

    if config.storage.retries == 0 {
        return Err(ConfigError::Validation(
            "storage retries must be > 0".to_string(),
        ));
    }

    if config.storage.channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "validator channel capacity must be > 0".to_string(),
        ));
    }

    if config.dispatch.default_run_timeout <= 0 {
        return Err(ConfigError::Validation(
            "default run timeout must be > 0".to_string(),
        ));
    }

    if config.sweep.enabled && config.sweep.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout sweep interval must be > 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dto::*;

    fn valid_config() -> DispatcherConfigDto {
        DispatcherConfigDto {
            database: DatabaseConfig {
                url: "postgres://localhost:5432/dispatcher".to_string(),
                max_open_connections: 20,
                max_idle_connections: 10,
                connect_timeout_secs: 30,
            },
            nats: NatsConfig::default(),
            topics: TopicsConfig::default(),
            cloud_connector: CloudConnectorConfig::default(),
            dispatch: DispatchConfig::default(),
            storage: StorageConfig::default(),
            sweep: SweepConfig::default(),
            api: ApiConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_dispatcher_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_database_url_scheme() {
        assert!(validate_database_url("postgresql://u:p@host:5432/db").is_ok());
        assert!(validate_database_url("mysql://host/db").is_err());
        assert!(validate_database_url("").is_err());
    }

    #[test]
    fn test_nats_url_scheme() {
        assert!(validate_nats_url("nats://localhost:4222").is_ok());
        assert!(validate_nats_url("http://localhost:4222").is_err());
    }

    #[test]
    fn test_idle_cannot_exceed_open() {
        let mut config = valid_config();
        config.database.max_idle_connections = 50;
        assert!(matches!(
            validate_dispatcher_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_fetch_pool_rejected() {
        let mut config = valid_config();
        config.storage.max_concurrency = 0;
        assert!(validate_dispatcher_config(&config).is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut config = valid_config();
        config.cloud_connector.rps = 0;
        assert!(validate_dispatcher_config(&config).is_err());
    }
}
