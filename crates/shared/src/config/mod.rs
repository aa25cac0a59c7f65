//! Configuration module for the playbook dispatcher
//!
//! Configuration is loaded once at startup, validated, and then handed to
//! components through constructor injection. Nothing reads the environment
//! after startup.
//!
//! # Usage
//!
//! ```ignore
//! use dispatcher_shared::config::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
//! let config = loader.load_dispatcher_config()?;
//! println!("Broker at {}", config.cloud_connector.base_url());
//! ```
//!
//! # Environment Variables
//!
//! ## Required Variables
//!
//! - `DISPATCHER_DATABASE_URL`: PostgreSQL connection string
//!
//! ## Optional Variables
//!
//! Every other `DISPATCHER_*` variable has a default, see [`dto`].
//! A variable that is set but cannot be parsed is an error.

pub mod dto;
pub mod error;
pub mod loader;
pub mod validator;

pub use dto::{
    ApiConfig, CloudConnectorConfig, DatabaseConfig, DispatchConfig, DispatcherConfigDto,
    LoggingConfig, NatsConfig, ShutdownConfig, StorageConfig, SweepConfig, TopicsConfig,
};
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use validator::{validate_database_url, validate_dispatcher_config, validate_nats_url};
