//! Hand-written port doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dispatcher_server_domain::{
    ArtifactFetcher, BrokerClient, BrokerEnvelope, BrokerOutcome, ConnectionStatus,
    CorrelationId, DomainError, HostWrite, MessageProducer, MessagingError, OutboundMessage,
    RecipientId, RequestContext, Result, Run, RunHost, RunId, RunRepository, RunSnapshot,
    RunStatus, SweepResult, UpdateOutcome, UpdatePlanner,
};

// ============================================================================
// Broker
// ============================================================================

#[derive(Clone)]
pub enum BrokerBehavior {
    Accept,
    NotFound,
    Fail,
}

#[derive(Clone)]
pub struct MockBroker {
    pub sent: Arc<Mutex<Vec<BrokerEnvelope>>>,
    pub behavior: BrokerBehavior,
    pub status: ConnectionStatus,
}

impl MockBroker {
    pub fn new(behavior: BrokerBehavior) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            behavior,
            status: ConnectionStatus::Connected,
        }
    }

    pub fn sent(&self) -> Vec<BrokerEnvelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn send(&self, _ctx: &RequestContext, envelope: &BrokerEnvelope) -> Result<BrokerOutcome> {
        self.sent.lock().unwrap().push(envelope.clone());
        match self.behavior {
            BrokerBehavior::Accept => Ok(BrokerOutcome::Accepted {
                message_id: uuid::Uuid::new_v4().to_string(),
            }),
            BrokerBehavior::NotFound => Ok(BrokerOutcome::RecipientNotFound),
            BrokerBehavior::Fail => Err(DomainError::BrokerTransport {
                message: "connection refused".to_string(),
            }),
        }
    }

    async fn connection_status(
        &self,
        _ctx: &RequestContext,
        _org_id: &str,
        _recipient: &RecipientId,
    ) -> Result<ConnectionStatus> {
        Ok(self.status)
    }
}

// ============================================================================
// Run repository
// ============================================================================

#[derive(Default)]
pub struct StoredRun {
    pub run: Option<Run>,
    pub hosts: Vec<RunHost>,
    pub events: Option<serde_json::Value>,
    pub host_writes: Vec<HostWrite>,
}

#[derive(Clone, Default)]
pub struct MockRunRepository {
    pub runs: Arc<Mutex<HashMap<RunId, StoredRun>>>,
    pub fail_writes: bool,
}

impl MockRunRepository {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, run: Run) {
        self.runs.lock().unwrap().insert(
            run.id,
            StoredRun {
                run: Some(run),
                ..Default::default()
            },
        );
    }

    pub fn run(&self, id: &RunId) -> Option<Run> {
        self.runs.lock().unwrap().get(id).and_then(|s| s.run.clone())
    }

    pub fn hosts(&self, id: &RunId) -> Vec<RunHost> {
        self.runs
            .lock()
            .unwrap()
            .get(id)
            .map(|s| s.hosts.clone())
            .unwrap_or_default()
    }

    pub fn host_writes(&self, id: &RunId) -> Vec<HostWrite> {
        self.runs
            .lock()
            .unwrap()
            .get(id)
            .map(|s| s.host_writes.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl RunRepository for MockRunRepository {
    async fn create(&self, run: &Run, hosts: &[RunHost]) -> Result<()> {
        if self.fail_writes {
            return Err(DomainError::persistence("database is down"));
        }
        self.runs.lock().unwrap().insert(
            run.id,
            StoredRun {
                run: Some(run.clone()),
                hosts: hosts.to_vec(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn find_by_id(&self, org_id: &str, run_id: &RunId) -> Result<Option<Run>> {
        Ok(self.run(run_id).filter(|run| run.org_id == org_id))
    }

    async fn find_hosts(&self, run_id: &RunId) -> Result<Vec<RunHost>> {
        Ok(self.hosts(run_id))
    }

    async fn apply_update(
        &self,
        org_id: &str,
        correlation_id: &CorrelationId,
        planner: &dyn UpdatePlanner,
    ) -> Result<UpdateOutcome> {
        if self.fail_writes {
            return Err(DomainError::persistence("database is down"));
        }

        let mut runs = self.runs.lock().unwrap();
        let stored = runs.values_mut().find(|stored| {
            stored
                .run
                .as_ref()
                .map(|r| r.org_id == org_id && r.correlation_id == *correlation_id)
                .unwrap_or(false)
        });

        let Some(stored) = stored else {
            return Ok(UpdateOutcome::Missed);
        };
        let Some(run) = stored.run.as_mut() else {
            return Ok(UpdateOutcome::Missed);
        };

        let plan = planner.plan(&RunSnapshot {
            id: run.id,
            status: run.status,
            response_full: run.response_full,
        });

        if let Some(status) = plan.status {
            run.status = status;
        }
        run.updated_at = Utc::now();
        stored.events = Some(plan.events);
        stored.host_writes.extend(plan.hosts);

        Ok(UpdateOutcome::Updated {
            run_id: run.id,
            status: run.status,
        })
    }

    async fn mark_timed_out(&self) -> Result<SweepResult> {
        let now = Utc::now();
        let mut result = SweepResult::default();
        for stored in self.runs.lock().unwrap().values_mut() {
            if let Some(run) = stored.run.as_mut() {
                if run.status == RunStatus::Running && run.deadline() <= now {
                    run.status = RunStatus::Timeout;
                    result.runs_timed_out += 1;
                }
                if run.status == RunStatus::Timeout {
                    for host in stored.hosts.iter_mut().filter(|h| h.status == RunStatus::Running) {
                        host.status = RunStatus::Timeout;
                        result.hosts_timed_out += 1;
                    }
                }
            }
        }
        Ok(result)
    }
}

// ============================================================================
// Producer / fetcher
// ============================================================================

#[derive(Clone, Default)]
pub struct MockProducer {
    pub produced: Arc<Mutex<Vec<OutboundMessage>>>,
    pub fail: bool,
}

impl MockProducer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn on_topic(&self, topic: &str) -> Vec<OutboundMessage> {
        self.produced
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageProducer for MockProducer {
    async fn produce(&self, message: OutboundMessage) -> std::result::Result<(), MessagingError> {
        if self.fail {
            return Err(MessagingError::PublishError("broker unavailable".to_string()));
        }
        self.produced.lock().unwrap().push(message);
        Ok(())
    }
}

/// Serves canned artifacts by url, counting every call
#[derive(Clone, Default)]
pub struct MockFetcher {
    pub artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub latency: Option<std::time::Duration>,
}

impl MockFetcher {
    pub fn with_artifact(self, url: &str, data: impl Into<Vec<u8>>) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(url.to_string(), data.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.artifacts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DomainError::Fetch {
                message: format!("{} not found", url),
            })
    }
}

pub fn recipient() -> RecipientId {
    RecipientId(uuid::Uuid::new_v4())
}
