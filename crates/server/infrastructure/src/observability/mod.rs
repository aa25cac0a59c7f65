//! Observability Module
//!
//! Structured logging setup shared by every process module.

pub mod tracing;

pub use self::tracing::{init_tracing, TracingConfig, TracingResult};
