//! Telemetry uploaded by remote workers
//!
//! Two flavors exist: ansible runner event streams and satellite event
//! streams. Both are parsed into typed events, correlated back to a run and
//! reduced to a run status.

pub mod runner;
pub mod satellite;

pub use runner::{RunnerEvent, RunnerEventData};
pub use satellite::{SatEvent, SatHostInfo};

use uuid::Uuid;

use crate::runs::{HostWrite, RunSnapshot, UpdatePlan, UpdatePlanner};
use crate::shared_kernel::{request_types, CorrelationId, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestFlavor {
    Runner,
    Satellite,
}

impl RequestFlavor {
    /// Flavor of an upload, from its service falling back to its category
    pub fn from_upload(service: &str, category: &str) -> Self {
        let declared = if service.is_empty() { category } else { service };
        Self::from_header(declared).unwrap_or(RequestFlavor::Runner)
    }

    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            request_types::RUNNER => Some(RequestFlavor::Runner),
            request_types::SATELLITE => Some(RequestFlavor::Satellite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestFlavor::Runner => request_types::RUNNER,
            RequestFlavor::Satellite => request_types::SATELLITE,
        }
    }
}

impl std::fmt::Display for RequestFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated event sequence of one flavor
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryBatch {
    Runner(Vec<RunnerEvent>),
    Satellite(Vec<SatEvent>),
}

impl TelemetryBatch {
    pub fn flavor(&self) -> RequestFlavor {
        match self {
            TelemetryBatch::Runner(_) => RequestFlavor::Runner,
            TelemetryBatch::Satellite(_) => RequestFlavor::Satellite,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TelemetryBatch::Runner(events) => events.len(),
            TelemetryBatch::Satellite(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            TelemetryBatch::Runner(events) => runner::correlation_id(events),
            TelemetryBatch::Satellite(events) => satellite::correlation_id(events),
        }
    }

    /// Events as a JSON array, in their current order
    pub fn events_json(&self) -> serde_json::Value {
        let serialized = match self {
            TelemetryBatch::Runner(events) => serde_json::to_value(events),
            TelemetryBatch::Satellite(events) => serde_json::to_value(events),
        };
        serialized.unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }

    /// Status of the whole run, ignoring what is stored
    pub fn inferred_status(&self) -> RunStatus {
        match self {
            TelemetryBatch::Runner(events) => runner::infer_status(events, None),
            TelemetryBatch::Satellite(events) => satellite::infer_status(events, None),
        }
    }
}

impl UpdatePlanner for TelemetryBatch {
    fn plan(&self, current: &RunSnapshot) -> UpdatePlan {
        match self {
            TelemetryBatch::Runner(events) => plan_runner(events, self.events_json()),
            TelemetryBatch::Satellite(events) => {
                plan_satellite(events, current, self.events_json())
            }
        }
    }
}

fn plan_runner(events: &[RunnerEvent], events_json: serde_json::Value) -> UpdatePlan {
    let status = runner::infer_status(events, None);
    let log = runner::stdout(events);

    let hosts = runner::hosts(events)
        .into_iter()
        .map(|host| HostWrite::Upsert {
            status: runner::infer_status(events, Some(&host)),
            log: log.clone(),
            host,
        })
        .collect();

    UpdatePlan {
        status: terminal(status),
        events: events_json,
        hosts,
    }
}

fn plan_satellite(
    events: &[SatEvent],
    current: &RunSnapshot,
    events_json: serde_json::Value,
) -> UpdatePlan {
    let status = if matches!(current.status, RunStatus::Failure | RunStatus::Canceled) {
        None
    } else if current.response_full {
        terminal(satellite::infer_status(events, None))
    } else {
        terminal(satellite::infer_partial_status(events))
    };

    let hosts = satellite::hosts(events)
        .into_iter()
        .filter_map(|host| {
            let inventory_id = match Uuid::parse_str(&host) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(host = %host, "Ignoring satellite host without inventory id");
                    return None;
                }
            };
            let info = satellite::host_info(events, &host);
            Some(HostWrite::Sequenced {
                inventory_id,
                sequence: info.sequence,
                status: satellite::infer_status(events, Some(&host)),
                console: info.console,
                append: !current.response_full,
            })
        })
        .collect();

    UpdatePlan {
        status,
        events: events_json,
        hosts,
    }
}

/// Only terminal statuses are written; `running` leaves the row as it is
fn terminal(status: RunStatus) -> Option<RunStatus> {
    status.is_terminal().then_some(status)
}
