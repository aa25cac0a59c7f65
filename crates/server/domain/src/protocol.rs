//! Wire protocols spoken to the remote worker families
//!
//! Runner (rhc-worker-playbook) and Satellite workers expect different
//! metadata vocabularies. The dispatch manager only talks to [`Protocol`].

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::runs::{CancelInput, RunInput};
use crate::shared_kernel::{request_types, CorrelationId, DomainError, Result};
use dispatcher_shared::config::DispatchConfig;

/// Ordered metadata sent alongside a directive
pub type Metadata = BTreeMap<String, String>;

/// Settings the protocols read when building metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub return_url: String,
    pub response_interval: String,
    pub satellite_response_full: bool,
}

impl From<&DispatchConfig> for ProtocolConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            return_url: config.return_url.clone(),
            response_interval: config.response_interval.clone(),
            satellite_response_full: config.satellite_response_full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Runner,
    Satellite,
}

impl Protocol {
    pub fn for_run(input: &RunInput) -> Self {
        if input.is_satellite() {
            Protocol::Satellite
        } else {
            Protocol::Runner
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Protocol::Runner => request_types::RUNNER,
            Protocol::Satellite => request_types::SATELLITE,
        }
    }

    /// Short name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Runner => "ansible",
            Protocol::Satellite => "satellite",
        }
    }

    pub fn response_full(&self, config: &ProtocolConfig) -> bool {
        match self {
            Protocol::Runner => true,
            Protocol::Satellite => config.satellite_response_full,
        }
    }

    /// Reject inputs the protocol cannot express
    pub fn validate(&self, input: &RunInput) -> Result<()> {
        if *self == Protocol::Runner {
            return Ok(());
        }

        if input.name.is_none() {
            return Err(DomainError::validation("satellite runs require a name"));
        }
        if input.principal.is_none() {
            return Err(DomainError::validation("satellite runs require a principal"));
        }
        if input.sat_org_id.is_none() {
            return Err(DomainError::validation("satellite runs require sat_org_id"));
        }
        if input.hosts.iter().any(|host| host.inventory_id.is_none()) {
            return Err(DomainError::validation(
                "satellite hosts require an inventory id",
            ));
        }

        Ok(())
    }

    pub fn build_metadata(
        &self,
        input: &RunInput,
        correlation_id: CorrelationId,
        config: &ProtocolConfig,
    ) -> Result<Metadata> {
        let mut metadata = common_metadata(config);

        match self {
            Protocol::Runner => {
                metadata.insert(
                    "crc_dispatcher_correlation_id".to_string(),
                    correlation_id.to_string(),
                );
            }
            Protocol::Satellite => {
                self.validate(input)?;

                let hosts = input
                    .hosts
                    .iter()
                    .filter_map(|host| host.inventory_id)
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");

                metadata.insert("operation".to_string(), "run".to_string());
                metadata.insert("correlation_id".to_string(), correlation_id.to_string());
                metadata.insert(
                    "playbook_run_name".to_string(),
                    input.name.clone().unwrap_or_default(),
                );
                metadata.insert(
                    "playbook_run_url".to_string(),
                    input.web_console_url.clone().unwrap_or_default(),
                );
                metadata.insert(
                    "sat_id".to_string(),
                    input.sat_id.map(|id| id.to_string()).unwrap_or_default(),
                );
                metadata.insert(
                    "sat_org_id".to_string(),
                    input.sat_org_id.clone().unwrap_or_default(),
                );
                metadata.insert(
                    "initiator_user_id".to_string(),
                    principal_hash(input.principal.as_deref().unwrap_or_default()),
                );
                metadata.insert("hosts".to_string(), hosts);
                metadata.insert(
                    "response_full".to_string(),
                    self.response_full(config).to_string(),
                );
            }
        }

        Ok(metadata)
    }
}

/// Metadata of a satellite cancel signal
pub fn build_cancel_metadata(input: &CancelInput, correlation_id: CorrelationId) -> Metadata {
    Metadata::from([
        ("operation".to_string(), "cancel".to_string()),
        ("correlation_id".to_string(), correlation_id.to_string()),
        (
            "initiator_user_id".to_string(),
            principal_hash(&input.principal),
        ),
    ])
}

/// Lowercase hex SHA-256 of the principal
pub fn principal_hash(principal: &str) -> String {
    hex::encode(Sha256::digest(principal.as_bytes()))
}

fn common_metadata(config: &ProtocolConfig) -> Metadata {
    Metadata::from([
        ("return_url".to_string(), config.return_url.clone()),
        (
            "response_interval".to_string(),
            config.response_interval.clone(),
        ),
    ])
}
