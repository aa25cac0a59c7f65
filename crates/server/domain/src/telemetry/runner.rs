//! Ansible runner event stream

use serde::{Deserialize, Serialize};

use crate::shared_kernel::{CorrelationId, RunStatus};

pub const EVENT_EXECUTOR_ON_START: &str = "executor_on_start";
pub const EVENT_PLAYBOOK_ON_STATS: &str = "playbook_on_stats";
pub const EVENT_RUNNER_ON_FAILED: &str = "runner_on_failed";
pub const EVENT_EXECUTOR_ON_FAILED: &str = "executor_on_failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerEvent {
    pub counter: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<RunnerEventData>,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc_dispatcher_correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc_dispatcher_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc_dispatcher_error_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_uuid: Option<String>,
}

impl RunnerEvent {
    pub fn host(&self) -> Option<&str> {
        self.event_data.as_ref().and_then(|data| data.host.as_deref())
    }
}

/// Order events by their counter
pub fn sort_by_counter(events: &mut [RunnerEvent]) {
    events.sort_by_key(|event| event.counter);
}

/// Status implied by the event stream.
///
/// With `host` set, failure markers of other hosts are ignored; the
/// playbook-level completion marker always counts.
pub fn infer_status(events: &[RunnerEvent], host: Option<&str>) -> RunStatus {
    let mut finished = false;
    let mut failed = false;

    for event in events {
        if event.event == EVENT_PLAYBOOK_ON_STATS {
            finished = true;
        }

        if let (Some(wanted), Some(actual)) = (host, event.host()) {
            if wanted != actual {
                continue;
            }
        }

        match event.event.as_str() {
            EVENT_RUNNER_ON_FAILED => failed = true,
            EVENT_EXECUTOR_ON_FAILED => {
                failed = true;
                finished = true;
            }
            _ => {}
        }
    }

    match (finished, failed) {
        (true, true) => RunStatus::Failure,
        (true, false) => RunStatus::Success,
        _ => RunStatus::Running,
    }
}

/// Distinct hosts mentioned by the stream, sorted
pub fn hosts(events: &[RunnerEvent]) -> Vec<String> {
    let mut hosts: Vec<String> = events
        .iter()
        .filter_map(|event| event.host().map(str::to_string))
        .collect();
    hosts.sort();
    hosts.dedup();
    hosts
}

/// Concatenated stdout in counter order
pub fn stdout(events: &[RunnerEvent]) -> String {
    let mut ordered: Vec<&RunnerEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.counter);

    ordered
        .into_iter()
        .filter_map(|event| event.stdout.as_deref())
        .collect()
}

/// Correlation id announced by the first `executor_on_start` event
pub fn correlation_id(events: &[RunnerEvent]) -> Option<CorrelationId> {
    events
        .iter()
        .filter(|event| event.event == EVENT_EXECUTOR_ON_START)
        .filter_map(|event| event.event_data.as_ref())
        .filter_map(|data| data.crc_dispatcher_correlation_id.as_deref())
        .find_map(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn event(counter: i64, name: &str, host: Option<&str>) -> RunnerEvent {
        RunnerEvent {
            counter,
            event: name.to_string(),
            event_data: host.map(|h| RunnerEventData {
                host: Some(h.to_string()),
                ..Default::default()
            }),
            start_line: 0,
            end_line: 0,
            stdout: None,
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }

    fn stream(names: &[&str]) -> Vec<RunnerEvent> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| event(i as i64, name, None))
            .collect()
    }

    #[rstest]
    #[case(&[], RunStatus::Running)]
    #[case(&["executor_on_start"], RunStatus::Running)]
    #[case(&["playbook_on_start", "playbook_on_stats"], RunStatus::Success)]
    #[case(&["playbook_on_start", "runner_on_failed", "playbook_on_stats"], RunStatus::Failure)]
    #[case(&["playbook_on_start", "runner_on_failed"], RunStatus::Running)]
    #[case(&["executor_on_start", "executor_on_failed"], RunStatus::Failure)]
    fn test_infer_status(#[case] names: &[&str], #[case] expected: RunStatus) {
        assert_eq!(infer_status(&stream(names), None), expected);
    }

    #[test]
    fn test_infer_status_per_host() {
        let events = vec![
            event(0, "runner_on_ok", Some("localhost")),
            event(1, "runner_on_failed", Some("web01")),
            event(2, "playbook_on_stats", None),
        ];

        assert_eq!(infer_status(&events, None), RunStatus::Failure);
        assert_eq!(infer_status(&events, Some("localhost")), RunStatus::Success);
        assert_eq!(infer_status(&events, Some("web01")), RunStatus::Failure);
    }

    #[test]
    fn test_hosts_sorted_and_unique() {
        let events = vec![
            event(0, "runner_on_start", Some("web02")),
            event(1, "runner_on_ok", Some("web01")),
            event(2, "runner_on_ok", Some("web02")),
            event(3, "playbook_on_stats", None),
        ];

        assert_eq!(hosts(&events), vec!["web01", "web02"]);
    }

    #[test]
    fn test_stdout_follows_counter_order() {
        let mut first = event(1, "playbook_on_start", None);
        first.stdout = Some("PLAY ".to_string());
        let mut second = event(2, "runner_on_ok", None);
        second.stdout = Some("ok".to_string());
        let mut third = event(3, "playbook_on_stats", None);
        third.stdout = Some(" RECAP".to_string());

        assert_eq!(stdout(&[third, first, second]), "PLAY ok RECAP");
    }

    #[test]
    fn test_correlation_id_from_executor_on_start() {
        let expected = CorrelationId::generate();
        let mut start = event(0, EVENT_EXECUTOR_ON_START, None);
        start.event_data = Some(RunnerEventData {
            crc_dispatcher_correlation_id: Some(expected.to_string()),
            ..Default::default()
        });

        let events = vec![event(1, "playbook_on_start", None), start];
        assert_eq!(correlation_id(&events), Some(expected));
    }

    #[test]
    fn test_correlation_id_missing() {
        assert_eq!(correlation_id(&stream(&["playbook_on_start"])), None);
    }
}
