//! Dispatch Manager
//!
//! Turns a run request into a protocol message, sends it through the rate
//! limited broker and records the run once the broker accepted it.

use std::sync::Arc;

use chrono::Utc;
use dispatcher_server_domain::{
    build_cancel_metadata, BrokerClient, BrokerEnvelope, BrokerOutcome, CancelInput,
    ConnectionStatus, CorrelationId, DomainError, Protocol, ProtocolConfig, RecipientId,
    RequestContext, Result, Run, RunHost, RunId, RunInput, RunRepository, RunStatus,
};
use dispatcher_shared::config::DispatchConfig;
use tracing::{debug, error, info, Instrument};

use super::rate_limiter::RateLimiter;

/// Settings of the dispatch manager
#[derive(Debug, Clone)]
pub struct DispatchManagerConfig {
    pub protocol: ProtocolConfig,
    pub web_console_url_default: String,
    pub default_run_timeout: i32,
    /// Every dispatch uses the nil correlation id
    pub demo_mode: bool,
}

impl From<&DispatchConfig> for DispatchManagerConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            protocol: ProtocolConfig::from(config),
            web_console_url_default: config.web_console_url_default.clone(),
            default_run_timeout: config.default_run_timeout,
            demo_mode: config.demo_mode,
        }
    }
}

/// Identifiers of a dispatched (or canceled) run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    pub run_id: RunId,
    pub correlation_id: CorrelationId,
}

pub struct DispatchManager {
    repository: Arc<dyn RunRepository>,
    broker: Arc<dyn BrokerClient>,
    rate_limiter: Arc<dyn RateLimiter>,
    config: DispatchManagerConfig,
}

impl DispatchManager {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        broker: Arc<dyn BrokerClient>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: DispatchManagerConfig,
    ) -> Self {
        Self {
            repository,
            broker,
            rate_limiter,
            config,
        }
    }

    /// Dispatch one run and record it.
    ///
    /// No record is created when the broker call fails. A persistence
    /// failure after the broker accepted the message is returned as an
    /// error; the remote side effect stays in place and the run is never
    /// tracked.
    pub async fn process_run(
        &self,
        ctx: &RequestContext,
        service: &str,
        mut input: RunInput,
    ) -> Result<DispatchResult> {
        let correlation_id = if self.config.demo_mode {
            CorrelationId::nil()
        } else {
            CorrelationId::generate()
        };

        let span = ctx.clone().with_correlation_id(correlation_id).span();

        async move {
            if input.web_console_url.is_none() {
                input.web_console_url = Some(self.config.web_console_url_default.clone());
            }
            let timeout = input.timeout.unwrap_or(self.config.default_run_timeout);
            if timeout <= 0 {
                return Err(DomainError::validation(format!(
                    "timeout must be positive, got {}",
                    timeout
                )));
            }
            input.timeout = Some(timeout);

            let protocol = Protocol::for_run(&input);
            protocol.validate(&input)?;
            let metadata =
                protocol.build_metadata(&input, correlation_id, &self.config.protocol)?;

            let envelope = BrokerEnvelope {
                recipient: input.recipient,
                org_id: input.org_id.clone(),
                directive: protocol.directive().to_string(),
                metadata,
                payload: Some(input.url.clone()),
            };

            self.rate_limiter.wait(ctx).await?;

            match self.broker.send(ctx, &envelope).await? {
                BrokerOutcome::Accepted { message_id } => {
                    debug!(
                        message_id = %message_id,
                        recipient = %input.recipient,
                        protocol = protocol.label(),
                        "Broker accepted run"
                    );
                }
                BrokerOutcome::RecipientNotFound => {
                    info!(recipient = %input.recipient, "Recipient not found");
                    return Err(DomainError::RecipientNotFound {
                        recipient: input.recipient,
                    });
                }
            }

            let now = Utc::now();
            let run = Run {
                id: RunId::new(),
                org_id: input.org_id.clone(),
                recipient: input.recipient,
                correlation_id,
                url: input.url.clone(),
                status: RunStatus::Running,
                labels: input.labels.clone(),
                timeout,
                service: service.to_string(),
                sat_id: input.sat_id,
                sat_org_id: input.sat_org_id.clone(),
                name: input.name.clone(),
                web_console_url: input.web_console_url.clone(),
                principal: input.principal.clone(),
                response_full: protocol.response_full(&self.config.protocol),
                created_at: now,
                updated_at: now,
            };

            let hosts: Vec<RunHost> = input
                .hosts
                .iter()
                .map(|host| RunHost::dispatched(run.id, host))
                .collect();

            if let Err(e) = self.repository.create(&run, &hosts).await {
                error!(
                    run_id = %run.id,
                    recipient = %run.recipient,
                    error = %e,
                    "Run was dispatched but could not be recorded"
                );
                return Err(e);
            }

            info!(
                run_id = %run.id,
                recipient = %run.recipient,
                hosts = hosts.len(),
                protocol = protocol.label(),
                "✅ Playbook run dispatched"
            );

            Ok(DispatchResult {
                run_id: run.id,
                correlation_id,
            })
        }
        .instrument(span)
        .await
    }

    /// Ask the remote satellite to cancel a running run
    pub async fn process_cancel(
        &self,
        ctx: &RequestContext,
        input: CancelInput,
    ) -> Result<DispatchResult> {
        let run = self
            .repository
            .find_by_id(&input.org_id, &input.run_id)
            .await?
            .ok_or(DomainError::RunNotFound {
                run_id: input.run_id,
            })?;

        if !run.is_satellite() {
            return Err(DomainError::RunCancelType { run_id: run.id });
        }

        if run.effective_status(Utc::now()) != RunStatus::Running {
            return Err(DomainError::RunNotCancelable { run_id: run.id });
        }

        let envelope = BrokerEnvelope {
            recipient: run.recipient,
            org_id: run.org_id.clone(),
            directive: Protocol::Satellite.directive().to_string(),
            metadata: build_cancel_metadata(&input, run.correlation_id),
            payload: None,
        };

        self.rate_limiter.wait(ctx).await?;

        match self.broker.send(ctx, &envelope).await? {
            BrokerOutcome::Accepted { .. } => {
                info!(
                    run_id = %run.id,
                    correlation_id = %run.correlation_id,
                    "Cancel signal sent"
                );
                Ok(DispatchResult {
                    run_id: run.id,
                    correlation_id: run.correlation_id,
                })
            }
            BrokerOutcome::RecipientNotFound => Err(DomainError::RecipientNotFound {
                recipient: run.recipient,
            }),
        }
    }

    pub async fn connection_status(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        recipient: &RecipientId,
    ) -> Result<ConnectionStatus> {
        self.rate_limiter.wait(ctx).await?;
        self.broker.connection_status(ctx, org_id, recipient).await
    }
}
