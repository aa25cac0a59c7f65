//! Tracing Module - subscriber installation for the dispatcher process
//!
//! One `fmt` layer filtered by `EnvFilter`. `RUST_LOG` wins over the
//! configured level when it is set.

use dispatcher_shared::config::LoggingConfig;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Configuration for tracing
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name logged at startup
    pub service_name: String,
    /// Whether to log locally at all
    pub log_enabled: bool,
    /// Filter used when `RUST_LOG` is absent
    pub log_level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "playbook-dispatcher".to_string(),
            log_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl From<&LoggingConfig> for TracingConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            log_level: config.level.clone(),
            ..Default::default()
        }
    }
}

/// Result of tracing initialization
#[derive(Debug, Default)]
pub struct TracingResult {
    pub initialized: bool,
    pub errors: Vec<String>,
}

fn env_filter(config: &TracingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global subscriber. A second call leaves the first one in
/// place and reports it in `errors`.
pub fn init_tracing(config: &TracingConfig) -> TracingResult {
    let mut result = TracingResult::default();

    if !config.log_enabled {
        return result;
    }

    let logging_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_writer(std::io::stdout)
        .with_filter(env_filter(config));

    let subscriber = tracing_subscriber::Registry::default().with(logging_layer);
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => {
            result.initialized = true;
            info!("Tracing initialized for service: {}", config.service_name);
        }
        Err(e) => result.errors.push(e.to_string()),
    }

    result
}
