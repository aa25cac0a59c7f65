use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub const ERROR_DB_UPDATE: &str = "db_update";
pub const ERROR_HEADER_MISSING: &str = "header_missing";
pub const ERROR_JSON_UNMARSHAL: &str = "json_unmarshal";

/// Outcome counters of the response consumer
#[derive(Debug, Clone)]
pub struct ResponseConsumerMetrics {
    pub runs_updated: IntCounter,
    pub update_misses: IntCounter,
    pub errors: IntCounterVec,
}

impl ResponseConsumerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let runs_updated = IntCounter::with_opts(Opts::new(
            "response_consumer_playbook_run_updated_total",
            "Run updates applied",
        ))?;
        let update_misses = IntCounter::with_opts(Opts::new(
            "response_consumer_playbook_run_update_miss_total",
            "Run updates that matched no run",
        ))?;
        let errors = IntCounterVec::new(
            Opts::new("response_consumer_error_total", "Run updates that failed"),
            &["reason"],
        )?;

        registry.register(Box::new(runs_updated.clone()))?;
        registry.register(Box::new(update_misses.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        for reason in [ERROR_DB_UPDATE, ERROR_HEADER_MISSING, ERROR_JSON_UNMARSHAL] {
            errors.with_label_values(&[reason]);
        }

        Ok(Self {
            runs_updated,
            update_misses,
            errors,
        })
    }

    pub fn record_error(&self, reason: &str) {
        self.errors.with_label_values(&[reason]).inc();
    }

    pub fn error_count(&self, reason: &str) -> u64 {
        self.errors.with_label_values(&[reason]).get()
    }
}
