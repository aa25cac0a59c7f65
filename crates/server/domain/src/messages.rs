//! Payloads exchanged over the message bus

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// "Artifact announced" notification from the upload pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressValidationRequest {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub request_id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub service: String,
    pub size: i64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub b64_identity: String,
    pub timestamp: DateTime<Utc>,
}

impl IngressValidationRequest {
    /// Partition key of the acknowledgment
    pub fn ack_key(&self) -> &str {
        if self.account.is_empty() {
            &self.org_id
        } else {
            &self.account
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationResult {
    Success,
    Failure,
}

/// Acknowledgment sent back to the upload pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressValidationResponse {
    #[serde(flatten)]
    pub request: IngressValidationRequest,
    pub validation: ValidationResult,
}

impl IngressValidationResponse {
    pub fn new(request: &IngressValidationRequest, validation: ValidationResult) -> Self {
        Self {
            request: request.clone(),
            validation,
        }
    }
}

/// Normalized run update, keyed by correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunUpdateMessage<E> {
    #[serde(default)]
    pub account: String,
    pub org_id: String,
    #[serde(default)]
    pub b64_identity: String,
    pub request_id: String,
    pub upload_timestamp: String,
    pub events: Vec<E>,
}

impl<E> RunUpdateMessage<E> {
    pub fn from_request(request: &IngressValidationRequest, events: Vec<E>) -> Self {
        Self {
            account: request.account.clone(),
            org_id: request.org_id.clone(),
            b64_identity: request.b64_identity.clone(),
            request_id: request.request_id.clone(),
            upload_timestamp: request
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            events,
        }
    }
}
