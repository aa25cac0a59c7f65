//! Run Timeout Sweeper
//!
//! Background task that persists the `timeout` status of runs whose deadline
//! (`created_at + timeout`) has passed. Reads already treat such runs as timed
//! out; the sweep makes it durable for their hosts too.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatcher_server_domain::{Result, RunRepository, SweepResult};
use dispatcher_shared::config::SweepConfig;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Configuration for the Timeout Sweeper
#[derive(Debug, Clone)]
pub struct TimeoutSweepConfig {
    /// Interval between sweeps (default: 60 seconds)
    pub check_interval: Duration,
    /// Whether the sweeper is enabled (default: true)
    pub enabled: bool,
}

impl Default for TimeoutSweepConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl From<&SweepConfig> for TimeoutSweepConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.interval_secs),
            enabled: config.enabled,
        }
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Copy)]
pub struct SweepReport {
    pub result: SweepResult,
    pub checked_at: DateTime<Utc>,
}

pub struct TimeoutSweeper {
    repository: Arc<dyn RunRepository>,
    config: TimeoutSweepConfig,
    shutdown: broadcast::Receiver<()>,
}

impl TimeoutSweeper {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        config: TimeoutSweepConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            repository,
            config,
            shutdown,
        }
    }

    /// Sweeps every `check_interval` until shutdown
    pub async fn run(&mut self) {
        if !self.config.enabled {
            info!("TimeoutSweeper is disabled");
            return;
        }

        info!(interval = ?self.config.check_interval, "TimeoutSweeper started");

        let mut interval = interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Timeout sweep failed");
                    }
                }
                _ = self.shutdown.recv() => {
                    info!("TimeoutSweeper shutting down");
                    break;
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport> {
        sweep(self.repository.as_ref()).await
    }
}

/// One sweep, also used by the `clean` command
pub async fn sweep(repository: &dyn RunRepository) -> Result<SweepReport> {
    let result = repository.mark_timed_out().await?;

    if result.runs_timed_out > 0 {
        info!(
            runs = result.runs_timed_out,
            hosts = result.hosts_timed_out,
            "⏰ Runs timed out"
        );
    } else {
        debug!("No runs past their deadline");
    }

    Ok(SweepReport {
        result,
        checked_at: Utc::now(),
    })
}
