//! Configuration loader
//!
//! Loads configuration from an optional .env file and the process
//! environment.

use std::path::Path;
use std::str::FromStr;

use super::dto::{
    ApiConfig, CloudConnectorConfig, DatabaseConfig, DispatchConfig, DispatcherConfigDto,
    LoggingConfig, NatsConfig, ShutdownConfig, StorageConfig, SweepConfig, TopicsConfig,
};
use super::error::{ConfigError, Result};
use super::validator::validate_dispatcher_config;

/// Prefix shared by every dispatcher variable
pub const ENV_PREFIX: &str = "DISPATCHER_";

/// Configuration loader
///
/// Values from the .env file are exported into the process environment
/// before the environment is read, so local overrides do not require
/// touching the shell.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the dispatcher configuration
    pub fn load_dispatcher_config(&self) -> Result<DispatcherConfigDto> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = DispatcherConfigDto::from_env()?;
        validate_dispatcher_config(&config)?;

        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

// ============================================================================
// from_env implementations
// ============================================================================

impl DispatcherConfigDto {
    /// Build the configuration from `DISPATCHER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            nats: NatsConfig::from_env()?,
            topics: TopicsConfig::from_env()?,
            cloud_connector: CloudConnectorConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            sweep: SweepConfig::from_env()?,
            api: ApiConfig::from_env()?,
            shutdown: ShutdownConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

impl DatabaseConfig {
    /// # Required Variables
    ///
    /// - `DISPATCHER_DATABASE_URL`
    ///
    /// # Optional Variables
    ///
    /// - `DISPATCHER_DB_MAX_OPEN_CONNECTIONS`: Default 20
    /// - `DISPATCHER_DB_MAX_IDLE_CONNECTIONS`: Default 10
    /// - `DISPATCHER_DB_CONNECT_TIMEOUT_SECS`: Default 30
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: required_var("DATABASE_URL")?,
            max_open_connections: parse_optional_var("DB_MAX_OPEN_CONNECTIONS", 20)?,
            max_idle_connections: parse_optional_var("DB_MAX_IDLE_CONNECTIONS", 10)?,
            connect_timeout_secs: parse_optional_var("DB_CONNECT_TIMEOUT_SECS", 30)?,
        })
    }
}

impl NatsConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: string_var("NATS_URL", &defaults.url),
            connect_timeout_secs: parse_optional_var(
                "NATS_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            )?,
            poll_timeout_ms: parse_optional_var("NATS_POLL_TIMEOUT_MS", defaults.poll_timeout_ms)?,
        })
    }
}

impl TopicsConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            updates: string_var("TOPIC_UPDATES", &defaults.updates),
            validation_request: string_var(
                "TOPIC_VALIDATION_REQUEST",
                &defaults.validation_request,
            ),
            validation_response: string_var(
                "TOPIC_VALIDATION_RESPONSE",
                &defaults.validation_response,
            ),
        })
    }
}

impl CloudConnectorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            scheme: string_var("CLOUD_CONNECTOR_SCHEME", &defaults.scheme),
            host: string_var("CLOUD_CONNECTOR_HOST", &defaults.host),
            port: parse_optional_var("CLOUD_CONNECTOR_PORT", defaults.port)?,
            client_id: string_var("CLOUD_CONNECTOR_CLIENT_ID", &defaults.client_id),
            psk: string_var("CLOUD_CONNECTOR_PSK", &defaults.psk),
            timeout_secs: parse_optional_var("CLOUD_CONNECTOR_TIMEOUT_SECS", defaults.timeout_secs)?,
            rps: parse_optional_var("CLOUD_CONNECTOR_RPS", defaults.rps)?,
            req_bucket: parse_optional_var("CLOUD_CONNECTOR_REQ_BUCKET", defaults.req_bucket)?,
        })
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            return_url: string_var("RETURN_URL", &defaults.return_url),
            response_interval: string_var("RESPONSE_INTERVAL", &defaults.response_interval),
            web_console_url_default: string_var(
                "WEB_CONSOLE_URL_DEFAULT",
                &defaults.web_console_url_default,
            ),
            default_run_timeout: parse_optional_var(
                "DEFAULT_RUN_TIMEOUT",
                defaults.default_run_timeout,
            )?,
            satellite_response_full: bool_var(
                "SATELLITE_RESPONSE_FULL",
                defaults.satellite_response_full,
            )?,
            demo_mode: bool_var("DEMO_MODE", defaults.demo_mode)?,
        })
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            timeout_secs: parse_optional_var("STORAGE_TIMEOUT_SECS", defaults.timeout_secs)?,
            retries: parse_optional_var("STORAGE_RETRIES", defaults.retries)?,
            max_concurrency: parse_optional_var(
                "STORAGE_MAX_CONCURRENCY",
                defaults.max_concurrency,
            )?,
            artifact_max_size: parse_optional_var(
                "ARTIFACT_MAX_SIZE",
                defaults.artifact_max_size,
            )?,
            channel_capacity: parse_optional_var(
                "VALIDATOR_CHANNEL_CAPACITY",
                defaults.channel_capacity,
            )?,
        })
    }
}

impl SweepConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: bool_var("TIMEOUT_SWEEP_ENABLED", defaults.enabled)?,
            interval_secs: parse_optional_var(
                "TIMEOUT_SWEEP_INTERVAL_SECS",
                defaults.interval_secs,
            )?,
        })
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let var = format!("{}API_BIND", ENV_PREFIX);
        let bind_address = match std::env::var(&var) {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidSocketAddr(format!("{}={}", var, raw)))?,
            Err(_) => Self::default().bind_address,
        };
        Ok(Self { bind_address })
    }
}

impl ShutdownConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            timeout_secs: parse_optional_var("SHUTDOWN_TIMEOUT_SECS", Self::default().timeout_secs)?,
        })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            level: string_var("LOG_LEVEL", &Self::default().level),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn prefixed(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

fn required_var(name: &str) -> Result<String> {
    let var = prefixed(name);
    std::env::var(&var).map_err(|_| ConfigError::MissingRequired { var })
}

fn string_var(name: &str, default: &str) -> String {
    std::env::var(prefixed(name)).unwrap_or_else(|_| default.to_string())
}

/// Unset → default. Set but unparsable → error.
fn parse_optional_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    let var = prefixed(name);
    match std::env::var(&var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &str, default: bool) -> Result<bool> {
    let var = prefixed(name);
    match std::env::var(&var) {
        Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    // Each test uses its own variable names; the process environment is shared
    // between test threads.

    #[test]
    fn test_config_loader_default_has_no_env_file() {
        let loader = ConfigLoader::default();
        assert!(loader.env_file_path.is_none());
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let loader = ConfigLoader::new(Some(PathBuf::from("/nonexistent/dispatcher.env")));
        let err = loader.load_dispatcher_config().unwrap_err();
        assert!(matches!(err, ConfigError::EnvFileLoad { .. }));
    }

    #[test]
    fn test_parse_optional_var_uses_default_when_unset() {
        let value: u32 = parse_optional_var("TEST_UNSET_NUMBER", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_optional_var_reads_value() {
        std::env::set_var("DISPATCHER_TEST_SET_NUMBER", "42");
        let value: u32 = parse_optional_var("TEST_SET_NUMBER", 7).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_optional_var_rejects_garbage() {
        std::env::set_var("DISPATCHER_TEST_BAD_NUMBER", "seven");
        let err = parse_optional_var::<u32>("TEST_BAD_NUMBER", 7).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[rstest]
    #[case("1", Some(true))]
    #[case("true", Some(true))]
    #[case("TRUE", Some(true))]
    #[case("0", Some(false))]
    #[case("false", Some(false))]
    #[case("maybe", None)]
    fn test_parse_bool(#[case] raw: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_bool(raw), expected);
    }

    #[test]
    fn test_required_var_missing() {
        let err = required_var("TEST_REQUIRED_MISSING").unwrap_err();
        match err {
            ConfigError::MissingRequired { var } => {
                assert_eq!(var, "DISPATCHER_TEST_REQUIRED_MISSING")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dto_defaults() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.default_run_timeout, 3600);
        assert_eq!(dispatch.response_interval, "600");
        assert!(dispatch.satellite_response_full);
        assert!(!dispatch.demo_mode);

        let storage = StorageConfig::default();
        assert_eq!(storage.retries, 3);
        assert_eq!(storage.max_concurrency, 5);
        assert_eq!(storage.artifact_max_size, 1_048_576);

        let connector = CloudConnectorConfig::default();
        assert_eq!(
            connector.base_url(),
            "http://localhost:8080/api/cloud-connector/"
        );
    }
}
