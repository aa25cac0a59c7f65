use async_trait::async_trait;
use uuid::Uuid;

use super::aggregate::{Run, RunHost};
use crate::shared_kernel::{CorrelationId, Result, RunId, RunStatus};

/// Row state read inside the update transaction
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub id: RunId,
    pub status: RunStatus,
    pub response_full: bool,
}

/// Per-host write derived from a telemetry batch
#[derive(Debug, Clone, PartialEq)]
pub enum HostWrite {
    /// Insert or overwrite the row identified by `(run_id, host)`
    Upsert {
        host: String,
        status: RunStatus,
        log: String,
    },
    /// Update the row identified by `(run_id, inventory_id)` when `sequence`
    /// is newer than the stored one
    Sequenced {
        inventory_id: Uuid,
        sequence: i32,
        status: RunStatus,
        console: String,
        /// Append to the stored log instead of replacing it
        append: bool,
    },
}

/// Outcome of applying telemetry to a run row
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    /// `None` leaves the stored status untouched
    pub status: Option<RunStatus>,
    pub events: serde_json::Value,
    pub hosts: Vec<HostWrite>,
}

/// Decides the writes for a run given its current row
pub trait UpdatePlanner: Send + Sync {
    fn plan(&self, current: &RunSnapshot) -> UpdatePlan;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { run_id: RunId, status: RunStatus },
    /// No run matched the tenant and correlation id
    Missed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub runs_timed_out: u64,
    pub hosts_timed_out: u64,
}

/// Durable store of runs and their hosts
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert the run and its hosts in one transaction
    async fn create(&self, run: &Run, hosts: &[RunHost]) -> Result<()>;

    async fn find_by_id(&self, org_id: &str, run_id: &RunId) -> Result<Option<Run>>;

    async fn find_hosts(&self, run_id: &RunId) -> Result<Vec<RunHost>>;

    /// Lock the run matching tenant and correlation id, then apply the plan
    /// produced for it, all in one transaction
    async fn apply_update(
        &self,
        org_id: &str,
        correlation_id: &CorrelationId,
        planner: &dyn UpdatePlanner,
    ) -> Result<UpdateOutcome>;

    /// Persist `timeout` for every expired running run, then for the running
    /// hosts of every timed-out run
    async fn mark_timed_out(&self) -> Result<SweepResult>;
}
