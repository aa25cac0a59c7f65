//! Response Consumer
//!
//! Applies validated run updates to the durable run state.

use std::sync::Arc;

use async_trait::async_trait;
use dispatcher_server_domain::telemetry::runner;
use dispatcher_server_domain::{
    headers, CorrelationId, InboundMessage, MessageHandler, RequestFlavor, RunRepository,
    RunUpdateMessage, RunnerEvent, SatEvent, TelemetryBatch, UpdateOutcome,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::metrics::{
    ResponseConsumerMetrics, ERROR_DB_UPDATE, ERROR_HEADER_MISSING, ERROR_JSON_UNMARSHAL,
};

pub struct ResponseConsumer {
    repository: Arc<dyn RunRepository>,
    metrics: Arc<ResponseConsumerMetrics>,
}

impl ResponseConsumer {
    pub fn new(repository: Arc<dyn RunRepository>, metrics: Arc<ResponseConsumerMetrics>) -> Self {
        Self {
            repository,
            metrics,
        }
    }

    fn parse<E: DeserializeOwned>(&self, message: &InboundMessage) -> Option<RunUpdateMessage<E>> {
        match serde_json::from_slice(&message.payload) {
            Ok(update) => Some(update),
            Err(e) => {
                self.metrics.record_error(ERROR_JSON_UNMARSHAL);
                warn!(topic = %message.topic, error = %e, "Skipping unparsable run update");
                None
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ResponseConsumer {
    async fn handle(&self, message: InboundMessage) {
        let Some(correlation_id) = message
            .header(headers::CORRELATION_ID)
            .and_then(|raw| raw.parse::<CorrelationId>().ok())
        else {
            self.metrics.record_error(ERROR_HEADER_MISSING);
            warn!(topic = %message.topic, "Skipping run update without a valid correlation id");
            return;
        };

        let Some(flavor) = message
            .header(headers::REQUEST_TYPE)
            .and_then(RequestFlavor::from_header)
        else {
            self.metrics.record_error(ERROR_HEADER_MISSING);
            warn!(correlation_id = %correlation_id, "Skipping run update without a request type");
            return;
        };

        let request_id = message.header(headers::REQUEST_ID).unwrap_or_default();

        let (org_id, batch) = match flavor {
            RequestFlavor::Runner => {
                let Some(update) = self.parse::<RunnerEvent>(&message) else {
                    return;
                };
                let mut events = update.events;
                runner::sort_by_counter(&mut events);
                (update.org_id, TelemetryBatch::Runner(events))
            }
            RequestFlavor::Satellite => {
                let Some(update) = self.parse::<SatEvent>(&message) else {
                    return;
                };
                (update.org_id, TelemetryBatch::Satellite(update.events))
            }
        };

        debug!(
            request_id = %request_id,
            correlation_id = %correlation_id,
            org_id = %org_id,
            flavor = %flavor,
            events = batch.len(),
            "Processing run update"
        );

        match self
            .repository
            .apply_update(&org_id, &correlation_id, &batch)
            .await
        {
            Ok(UpdateOutcome::Updated { run_id, status }) => {
                self.metrics.runs_updated.inc();
                info!(
                    run_id = %run_id,
                    correlation_id = %correlation_id,
                    status = %status,
                    "Run updated"
                );
            }
            Ok(UpdateOutcome::Missed) => {
                self.metrics.update_misses.inc();
                warn!(
                    correlation_id = %correlation_id,
                    org_id = %org_id,
                    "No run matches the update"
                );
            }
            Err(e) => {
                self.metrics.record_error(ERROR_DB_UPDATE);
                error!(
                    correlation_id = %correlation_id,
                    org_id = %org_id,
                    error = %e,
                    "Failed to apply run update"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{recipient, MockRunRepository};
    use chrono::{Duration, Utc};
    use dispatcher_server_domain::{HostWrite, Labels, Run, RunId, RunStatus};
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    const HOST: &str = "ee4bbcd0-a782-4335-a904-c690b60ec4c4";

    fn metrics() -> Arc<ResponseConsumerMetrics> {
        Arc::new(ResponseConsumerMetrics::new(&prometheus::Registry::new()).unwrap())
    }

    fn consumer_for(repository: &MockRunRepository) -> ResponseConsumer {
        ResponseConsumer::new(Arc::new(repository.clone()), metrics())
    }

    fn run(correlation_id: CorrelationId, satellite: bool) -> Run {
        let now = Utc::now() - Duration::seconds(5);
        Run {
            id: RunId::new(),
            org_id: "5318290".to_string(),
            recipient: recipient(),
            correlation_id,
            url: "http://example.com/playbook.yml".to_string(),
            status: RunStatus::Running,
            labels: Labels::new(),
            timeout: 3600,
            service: "test".to_string(),
            sat_id: satellite.then(Uuid::new_v4),
            sat_org_id: satellite.then(|| "1".to_string()),
            name: None,
            web_console_url: None,
            principal: None,
            response_full: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(correlation_id: CorrelationId, service: &str, org_id: &str, events: serde_json::Value) -> InboundMessage {
        let payload = json!({
            "account": "901578",
            "org_id": org_id,
            "b64_identity": "",
            "request_id": "380b4a04-7eae-4dff-a0b8-6e1af9186df1",
            "upload_timestamp": "2021-01-22T14:42:00Z",
            "events": events,
        });
        InboundMessage {
            topic: "platform.playbook-dispatcher.runner-updates".to_string(),
            headers: HashMap::from([
                (headers::CORRELATION_ID.to_string(), correlation_id.to_string()),
                (headers::REQUEST_TYPE.to_string(), service.to_string()),
                (headers::REQUEST_ID.to_string(), "380b4a04".to_string()),
            ]),
            payload: serde_json::to_vec(&payload).unwrap(),
        }
    }

    fn runner_event(counter: i64, event: &str, host: Option<&str>, stdout: &str) -> serde_json::Value {
        let mut value = json!({
            "event": event,
            "uuid": Uuid::new_v4().to_string(),
            "counter": counter,
            "stdout": stdout,
            "start_line": 0,
            "end_line": 0
        });
        if let Some(host) = host {
            value["event_data"] = json!({ "host": host });
        }
        value
    }

    #[tokio::test]
    async fn test_runner_success_updates_run_and_hosts() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let events = json!([
            runner_event(2, "playbook_on_stats", None, "done"),
            runner_event(1, "runner_on_ok", Some("localhost"), "ok: [localhost]\n"),
            runner_event(0, "playbook_on_start", None, "PLAY\n"),
        ]);
        consumer
            .handle(message(correlation_id, "playbook", "5318290", events))
            .await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Success);
        assert_eq!(
            repository.host_writes(&stored.id),
            vec![HostWrite::Upsert {
                host: "localhost".to_string(),
                status: RunStatus::Success,
                log: "PLAY\nok: [localhost]\ndone".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_runner_failure_marker_fails_run() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let events = json!([
            runner_event(0, "playbook_on_start", None, ""),
            runner_event(1, "runner_on_failed", Some("localhost"), "fatal"),
            runner_event(2, "playbook_on_stats", None, ""),
        ]);
        consumer
            .handle(message(correlation_id, "playbook", "5318290", events))
            .await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Failure);
    }

    #[tokio::test]
    async fn test_in_progress_update_keeps_status() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let events = json!([runner_event(0, "playbook_on_start", None, "")]);
        consumer
            .handle(message(correlation_id, "playbook", "5318290", events))
            .await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_update_for_other_tenant_is_ignored() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let events = json!([runner_event(0, "playbook_on_stats", None, "")]);
        consumer
            .handle(message(correlation_id, "playbook", "other-org", events))
            .await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_replayed_terminal_update_is_stable() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        for _ in 0..2 {
            let events = json!([runner_event(0, "playbook_on_stats", None, "")]);
            consumer
                .handle(message(correlation_id, "playbook", "5318290", events))
                .await;
        }

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_satellite_update_writes_sequenced_host() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, true);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let cid = correlation_id.to_string();
        let events = json!([
            {"type": "playbook_run_update", "version": 3, "correlation_id": cid, "sequence": 0, "host": HOST, "console": "PLAY [ping]"},
            {"type": "playbook_run_finished", "version": 3, "correlation_id": cid, "host": HOST, "status": "failure", "connection_code": 0, "execution_code": 1},
            {"type": "playbook_run_completed", "version": 3, "correlation_id": cid, "status": "failure"}
        ]);
        consumer
            .handle(message(correlation_id, "playbook-sat", "5318290", events))
            .await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Failure);
        assert_eq!(
            repository.host_writes(&stored.id),
            vec![HostWrite::Sequenced {
                inventory_id: Uuid::parse_str(HOST).unwrap(),
                sequence: 0,
                status: RunStatus::Failure,
                console: "PLAY [ping]".to_string(),
                append: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_headers_are_skipped() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        let stored = run(correlation_id, false);
        repository.insert(stored.clone());
        let consumer = consumer_for(&repository);

        let mut msg = message(
            correlation_id,
            "playbook",
            "5318290",
            json!([runner_event(0, "playbook_on_stats", None, "")]),
        );
        msg.headers.remove(headers::CORRELATION_ID);
        consumer.handle(msg).await;

        let mut msg = message(correlation_id, "unknown", "5318290", json!([]));
        msg.payload = b"{}".to_vec();
        consumer.handle(msg).await;

        assert_eq!(repository.run(&stored.id).unwrap().status, RunStatus::Running);
        assert!(repository.host_writes(&stored.id).is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let repository = MockRunRepository::default();
        let correlation_id = CorrelationId::generate();
        repository.insert(run(correlation_id, false));
        let metrics = metrics();
        let consumer = ResponseConsumer::new(Arc::new(repository.clone()), metrics.clone());

        let events = json!([runner_event(0, "playbook_on_stats", None, "")]);
        consumer
            .handle(message(correlation_id, "playbook", "5318290", events.clone()))
            .await;
        consumer
            .handle(message(CorrelationId::generate(), "playbook", "5318290", events.clone()))
            .await;

        let mut no_headers = message(correlation_id, "playbook", "5318290", events.clone());
        no_headers.headers.clear();
        consumer.handle(no_headers).await;

        let mut garbage = message(correlation_id, "playbook", "5318290", events.clone());
        garbage.payload = b"not json".to_vec();
        consumer.handle(garbage).await;

        let failing = ResponseConsumer::new(Arc::new(MockRunRepository::failing()), metrics.clone());
        failing
            .handle(message(correlation_id, "playbook", "5318290", events))
            .await;

        assert_eq!(metrics.runs_updated.get(), 1);
        assert_eq!(metrics.update_misses.get(), 1);
        assert_eq!(metrics.error_count(ERROR_HEADER_MISSING), 1);
        assert_eq!(metrics.error_count(ERROR_JSON_UNMARSHAL), 1);
        assert_eq!(metrics.error_count(ERROR_DB_UPDATE), 1);
    }
}
