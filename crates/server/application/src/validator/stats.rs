//! Validator counters, registered on the process registry

use prometheus::{IntCounter, Opts, Registry};

#[derive(Debug, Clone)]
pub struct ValidatorStats {
    fetch_failures: IntCounter,
    validation_successes: IntCounter,
    validation_failures: IntCounter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStatsSnapshot {
    pub fetch_failures: u64,
    pub validation_successes: u64,
    pub validation_failures: u64,
}

impl ValidatorStats {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let fetch_failures = IntCounter::with_opts(Opts::new(
            "validator_fetch_error_total",
            "Uploads dropped because the artifact could not be fetched",
        ))?;
        let validation_successes = IntCounter::with_opts(Opts::new(
            "validator_success_total",
            "Uploads that passed validation",
        ))?;
        let validation_failures = IntCounter::with_opts(Opts::new(
            "validator_failure_total",
            "Uploads rejected by validation",
        ))?;

        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(validation_successes.clone()))?;
        registry.register(Box::new(validation_failures.clone()))?;

        Ok(Self {
            fetch_failures,
            validation_successes,
            validation_failures,
        })
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.inc();
    }

    pub fn record_success(&self) {
        self.validation_successes.inc();
    }

    pub fn record_failure(&self) {
        self.validation_failures.inc();
    }

    pub fn snapshot(&self) -> ValidatorStatsSnapshot {
        ValidatorStatsSnapshot {
            fetch_failures: self.fetch_failures.get(),
            validation_successes: self.validation_successes.get(),
            validation_failures: self.validation_failures.get(),
        }
    }
}
