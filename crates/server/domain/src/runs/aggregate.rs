//! Run aggregate
//!
//! A Run is one dispatched unit of work. It is created together with its
//! RunHost rows once the broker accepted the message, and afterwards only
//! mutated by telemetry updates or the timeout sweep.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared_kernel::{CorrelationId, RecipientId, RunHostId, RunId, RunStatus};

/// String-keyed run metadata
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub org_id: String,
    pub recipient: RecipientId,
    pub correlation_id: CorrelationId,
    pub url: String,
    pub status: RunStatus,
    pub labels: Labels,
    /// Seconds, relative to `created_at`
    pub timeout: i32,
    pub service: String,
    pub sat_id: Option<Uuid>,
    pub sat_org_id: Option<String>,
    pub name: Option<String>,
    pub web_console_url: Option<String>,
    pub principal: Option<String>,
    pub response_full: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Status as observed at `now`.
    ///
    /// A running run whose deadline passed reads as `timeout` even before the
    /// sweep persisted it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RunStatus {
        if self.status == RunStatus::Running && self.deadline() <= now {
            RunStatus::Timeout
        } else {
            self.status
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(i64::from(self.timeout))
    }

    pub fn is_satellite(&self) -> bool {
        self.sat_id.is_some() && self.sat_org_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHost {
    pub id: RunHostId,
    pub run_id: RunId,
    pub inventory_id: Option<Uuid>,
    /// Display name of the host
    pub host: String,
    pub status: RunStatus,
    pub log: String,
    pub sat_sequence: Option<i32>,
}

impl RunHost {
    /// Initial row for a dispatched host
    pub fn dispatched(run_id: RunId, input: &RunHostInput) -> Self {
        let host = input
            .ansible_host
            .clone()
            .or_else(|| input.inventory_id.map(|id| id.to_string()))
            .unwrap_or_default();

        Self {
            id: RunHostId::new(),
            run_id,
            inventory_id: input.inventory_id,
            host,
            status: RunStatus::Running,
            log: String::new(),
            sat_sequence: None,
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHostInput {
    #[serde(default)]
    pub ansible_host: Option<String>,
    #[serde(default)]
    pub inventory_id: Option<Uuid>,
}

/// A validated request to dispatch one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub recipient: RecipientId,
    pub org_id: String,
    pub url: String,
    #[serde(default)]
    pub hosts: Vec<RunHostInput>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub timeout: Option<i32>,
    #[serde(default)]
    pub sat_id: Option<Uuid>,
    #[serde(default)]
    pub sat_org_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_console_url: Option<String>,
    #[serde(default)]
    pub principal: Option<String>,
}

impl RunInput {
    pub fn new(recipient: RecipientId, org_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            recipient,
            org_id: org_id.into(),
            url: url.into(),
            hosts: Vec::new(),
            labels: Labels::new(),
            timeout: None,
            sat_id: None,
            sat_org_id: None,
            name: None,
            web_console_url: None,
            principal: None,
        }
    }

    pub fn is_satellite(&self) -> bool {
        self.sat_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelInput {
    pub run_id: RunId,
    pub org_id: String,
    pub principal: String,
}
