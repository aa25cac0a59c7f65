//! Satellite event stream

use serde::{Deserialize, Serialize};

use crate::shared_kernel::{CorrelationId, RunStatus};

pub const EVENT_PLAYBOOK_RUN_UPDATE: &str = "playbook_run_update";
pub const EVENT_PLAYBOOK_RUN_FINISHED: &str = "playbook_run_finished";
pub const EVENT_PLAYBOOK_RUN_COMPLETED: &str = "playbook_run_completed";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";
pub const STATUS_CANCELED: &str = "canceled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: i64,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_connection_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_connection_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_infrastructure_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_infrastructure_error: Option<String>,
}

impl SatEvent {
    fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

/// Progress of one host collected from the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SatHostInfo {
    /// Last sequence number seen
    pub sequence: i32,
    pub console: String,
}

pub fn infer_status(events: &[SatEvent], host: Option<&str>) -> RunStatus {
    let mut finished = false;
    let mut failed = false;
    let mut canceled = false;

    for event in events {
        if event.event_type == EVENT_PLAYBOOK_RUN_COMPLETED {
            finished = true;
        }

        if let (Some(wanted), Some(actual)) = (host, event.host.as_deref()) {
            if wanted != actual {
                continue;
            }
        }

        if event.event_type == EVENT_PLAYBOOK_RUN_FINISHED {
            finished = true;
        }
        if event.has_status(STATUS_CANCELED) {
            canceled = true;
        }
        if event.has_status(STATUS_FAILURE) {
            failed = true;
        }
    }

    match (finished, canceled, failed) {
        (true, true, _) => RunStatus::Canceled,
        (true, false, true) => RunStatus::Failure,
        (true, false, false) => RunStatus::Success,
        _ => RunStatus::Running,
    }
}

/// Status of a run that asked for partial responses: only the
/// `playbook_run_completed` signal decides it
pub fn infer_partial_status(events: &[SatEvent]) -> RunStatus {
    let completed: Vec<&SatEvent> = events
        .iter()
        .filter(|event| event.event_type == EVENT_PLAYBOOK_RUN_COMPLETED)
        .collect();

    if completed.iter().any(|e| e.has_status(STATUS_SUCCESS)) {
        RunStatus::Success
    } else if completed.iter().any(|e| e.has_status(STATUS_FAILURE)) {
        RunStatus::Failure
    } else if completed.iter().any(|e| e.has_status(STATUS_CANCELED)) {
        RunStatus::Canceled
    } else {
        RunStatus::Running
    }
}

pub fn hosts(events: &[SatEvent]) -> Vec<String> {
    let mut hosts: Vec<String> = events.iter().filter_map(|e| e.host.clone()).collect();
    hosts.sort();
    hosts.dedup();
    hosts
}

pub fn host_info(events: &[SatEvent], host: &str) -> SatHostInfo {
    let mut info = SatHostInfo::default();

    for event in events {
        if matches!(event.host.as_deref(), Some(other) if other != host) {
            continue;
        }
        if let Some(sequence) = event.sequence {
            info.sequence = sequence;
        }
        if let Some(console) = &event.console {
            info.console.push_str(console);
        }
        if event.satellite_connection_code.unwrap_or(0) != 0 {
            if let Some(error) = &event.satellite_connection_error {
                info.console.push_str(error);
            }
        }
        if event.satellite_infrastructure_code.unwrap_or(0) != 0 {
            if let Some(error) = &event.satellite_infrastructure_error {
                info.console.push_str(error);
            }
        }
    }

    info
}

/// Correlation id of the first record
pub fn correlation_id(events: &[SatEvent]) -> Option<CorrelationId> {
    events.first().and_then(|event| event.correlation_id.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRELATION_ID: &str = "0465783c-2e36-4e57-8514-c2cb962d323a";

    fn event(event_type: &str, host: Option<&str>, status: Option<&str>) -> SatEvent {
        SatEvent {
            event_type: event_type.to_string(),
            version: 3,
            correlation_id: CORRELATION_ID.to_string(),
            host: host.map(str::to_string),
            sequence: None,
            console: None,
            status: status.map(str::to_string),
            connection_code: None,
            execution_code: None,
            satellite_connection_code: None,
            satellite_connection_error: None,
            satellite_infrastructure_code: None,
            satellite_infrastructure_error: None,
        }
    }

    #[test]
    fn test_empty_stream_is_running() {
        assert_eq!(infer_status(&[], None), RunStatus::Running);
        assert_eq!(infer_partial_status(&[]), RunStatus::Running);
    }

    #[test]
    fn test_completed_success() {
        let events = vec![
            event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h1"), None),
            event(EVENT_PLAYBOOK_RUN_FINISHED, Some("h1"), Some(STATUS_SUCCESS)),
            event(EVENT_PLAYBOOK_RUN_COMPLETED, None, Some(STATUS_SUCCESS)),
        ];
        assert_eq!(infer_status(&events, None), RunStatus::Success);
    }

    #[test]
    fn test_failed_host_fails_the_run() {
        let events = vec![
            event(EVENT_PLAYBOOK_RUN_FINISHED, Some("h1"), Some(STATUS_SUCCESS)),
            event(EVENT_PLAYBOOK_RUN_FINISHED, Some("h2"), Some(STATUS_FAILURE)),
            event(EVENT_PLAYBOOK_RUN_COMPLETED, None, Some(STATUS_FAILURE)),
        ];
        assert_eq!(infer_status(&events, None), RunStatus::Failure);
        assert_eq!(infer_status(&events, Some("h1")), RunStatus::Failure);
        assert_eq!(
            infer_status(&events[..1], Some("h1")),
            RunStatus::Success
        );
    }

    #[test]
    fn test_canceled_wins_over_failure() {
        let events = vec![
            event(EVENT_PLAYBOOK_RUN_FINISHED, Some("h1"), Some(STATUS_FAILURE)),
            event(EVENT_PLAYBOOK_RUN_FINISHED, Some("h2"), Some(STATUS_CANCELED)),
        ];
        assert_eq!(infer_status(&events, None), RunStatus::Canceled);
    }

    #[test]
    fn test_partial_status_ignores_host_events() {
        let events = vec![event(
            EVENT_PLAYBOOK_RUN_FINISHED,
            Some("h1"),
            Some(STATUS_SUCCESS),
        )];
        assert_eq!(infer_partial_status(&events), RunStatus::Running);

        let events = vec![event(EVENT_PLAYBOOK_RUN_COMPLETED, None, Some(STATUS_CANCELED))];
        assert_eq!(infer_partial_status(&events), RunStatus::Canceled);
    }

    #[test]
    fn test_host_info() {
        let mut first = event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h1"), None);
        first.sequence = Some(1);
        first.console = Some("line 1\n".to_string());
        let mut other = event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h2"), None);
        other.sequence = Some(7);
        other.console = Some("ignored".to_string());
        let mut second = event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h1"), None);
        second.sequence = Some(2);
        second.console = Some("line 2\n".to_string());
        let mut completed = event(EVENT_PLAYBOOK_RUN_COMPLETED, None, Some(STATUS_FAILURE));
        completed.satellite_connection_code = Some(1);
        completed.satellite_connection_error = Some("connection lost".to_string());

        let info = host_info(&[first, other, second, completed], "h1");

        assert_eq!(info.sequence, 2);
        assert_eq!(info.console, "line 1\nline 2\nconnection lost");
    }

    #[test]
    fn test_hosts_and_correlation() {
        let events = vec![
            event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h2"), None),
            event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h1"), None),
            event(EVENT_PLAYBOOK_RUN_UPDATE, Some("h2"), None),
        ];
        assert_eq!(hosts(&events), vec!["h1", "h2"]);
        assert_eq!(
            correlation_id(&events).map(|id| id.to_string()),
            Some(CORRELATION_ID.to_string())
        );
    }
}
