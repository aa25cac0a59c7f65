//! JSON Schemas gating inbound telemetry

use dispatcher_server_domain::{DomainError, RequestFlavor, Result};
use serde_json::Value;

const RUNNER_EVENT_SCHEMA: &str = include_str!("schemas/runner_event.json");
const SATELLITE_EVENT_SCHEMA: &str = include_str!("schemas/satellite_event.json");

/// Compiled validators for both telemetry flavors
pub struct SchemaValidator {
    runner: jsonschema::Validator,
    satellite: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            runner: compile(RUNNER_EVENT_SCHEMA)?,
            satellite: compile(SATELLITE_EVENT_SCHEMA)?,
        })
    }

    /// Check one record against the schema of `flavor`
    pub fn validate(&self, flavor: RequestFlavor, record: &Value) -> Result<()> {
        let validator = match flavor {
            RequestFlavor::Runner => &self.runner,
            RequestFlavor::Satellite => &self.satellite,
        };

        validator
            .validate(record)
            .map_err(|e| DomainError::validation(e.to_string()))
    }
}

fn compile(raw: &str) -> Result<jsonschema::Validator> {
    let schema: Value = serde_json::from_str(raw)
        .map_err(|e| DomainError::validation(format!("invalid embedded schema: {}", e)))?;

    jsonschema::options()
        .should_validate_formats(true)
        .build(&schema)
        .map_err(|e| DomainError::validation(format!("invalid embedded schema: {}", e)))
}
