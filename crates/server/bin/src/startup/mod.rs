//! Startup module - orchestrates process wiring.
//!
//! Each `run` module gets its adapters here; they share one database pool,
//! one NATS connection, one error channel and one shutdown coordinator.

pub mod shutdown;

use std::sync::Arc;

use anyhow::Context;
use dispatcher_server_application::dispatch::{RateLimitConfig, TokenBucketRateLimiter};
use dispatcher_server_application::timeouts::sweep;
use dispatcher_server_application::{
    DispatchManager, DispatchManagerConfig, ResponseConsumer, ResponseConsumerMetrics,
    TimeoutSweepConfig, TimeoutSweeper, Validator, ValidatorConfig, ValidatorStats,
};
use dispatcher_server_domain::{DomainError, RunRepository};
use dispatcher_server_infrastructure::{
    CloudConnectorClient, ConsumerConfig, DatabasePool, HttpArtifactFetcher, MigrationService,
    NatsConnection, NatsConsumer, NatsProducer, PostgresRunRepository,
};
use dispatcher_shared::config::DispatcherConfigDto;
use prometheus::Registry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{self, ApiState};
use shutdown::{start_signal_handler, GracefulShutdown};

/// Current application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const VALIDATOR_GROUP: &str = "playbook-dispatcher-validator";
const RESPONSE_CONSUMER_GROUP: &str = "playbook-dispatcher-response-consumer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Module {
    Api,
    Validator,
    ResponseConsumer,
}

async fn connect_database(config: &DispatcherConfigDto) -> anyhow::Result<sqlx::PgPool> {
    let pool = DatabasePool::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("✓ Database connected");
    Ok(pool.pg_pool())
}

/// Apply the embedded schema migrations
pub async fn migrate(config: &DispatcherConfigDto) -> anyhow::Result<()> {
    let pool = connect_database(config).await?;
    let applied = MigrationService::new(pool)
        .run_all()
        .await
        .context("Failed to run migrations")?;
    info!(applied, "✓ Migrations applied");
    Ok(())
}

/// One timeout sweep
pub async fn clean(config: &DispatcherConfigDto) -> anyhow::Result<()> {
    let pool = connect_database(config).await?;
    let repository = PostgresRunRepository::new(pool);
    let report = sweep(&repository).await?;
    info!(
        runs = report.result.runs_timed_out,
        hosts = report.result.hosts_timed_out,
        "✓ Timeout sweep finished"
    );
    Ok(())
}

/// Run the selected modules until a signal or a fatal error arrives
pub async fn run(config: DispatcherConfigDto, modules: Vec<Module>) -> anyhow::Result<()> {
    let modules = if modules.is_empty() {
        vec![Module::Api, Module::Validator, Module::ResponseConsumer]
    } else {
        modules
    };

    info!(
        "Starting playbook dispatcher v{} with modules {:?}",
        APP_VERSION, modules
    );

    let shutdown = GracefulShutdown::new(config.shutdown.timeout());
    start_signal_handler(&shutdown);

    let (errors_tx, errors_rx) = mpsc::unbounded_channel::<DomainError>();
    shutdown.watch_errors(errors_rx);

    let registry = Arc::new(Registry::new());

    let pool = connect_database(&config).await?;
    let repository: Arc<dyn RunRepository> = Arc::new(PostgresRunRepository::new(pool));

    let needs_bus = modules
        .iter()
        .any(|m| matches!(m, Module::Validator | Module::ResponseConsumer));
    let nats = if needs_bus {
        let nats = NatsConnection::connect(&config.nats)
            .await
            .context("Failed to connect to NATS")?;
        nats.ensure_streams()
            .await
            .context("Failed to create JetStream streams")?;
        info!("✓ NATS streams ready");
        Some(nats)
    } else {
        None
    };

    let mut components: Vec<JoinHandle<()>> = Vec::new();

    for module in &modules {
        match module {
            Module::Api => {
                components.push(
                    start_api(&config, repository.clone(), registry.clone(), &shutdown).await?,
                );
            }
            Module::Validator => {
                let nats = nats.as_ref().context("NATS connection missing")?;
                components.push(start_validator(
                    &config,
                    nats,
                    &registry,
                    errors_tx.clone(),
                    &shutdown,
                )?);
            }
            Module::ResponseConsumer => {
                let nats = nats.as_ref().context("NATS connection missing")?;
                components.push(start_response_consumer(
                    &config,
                    nats,
                    repository.clone(),
                    &registry,
                    errors_tx.clone(),
                    &shutdown,
                )?);
            }
        }
    }

    if config.sweep.enabled {
        let mut sweeper = TimeoutSweeper::new(
            repository.clone(),
            TimeoutSweepConfig::from(&config.sweep),
            shutdown.subscribe(),
        );
        components.push(shutdown.spawn_component("timeout-sweeper", async move {
            sweeper.run().await;
        }));
    }

    let reason = shutdown.wait_for_signal().await;
    info!(%reason, "Shutting down");

    let graceful = shutdown.drain(components).await;

    if let Some(nats) = nats {
        if let Err(e) = nats.close().await {
            error!(error = %e, "Failed to flush NATS connection");
        }
    }

    if graceful {
        info!("Shutdown complete");
    }
    Ok(())
}

async fn start_api(
    config: &DispatcherConfigDto,
    repository: Arc<dyn RunRepository>,
    registry: Arc<Registry>,
    shutdown: &GracefulShutdown,
) -> anyhow::Result<JoinHandle<()>> {
    let broker = CloudConnectorClient::new(&config.cloud_connector)?;
    let limiter = TokenBucketRateLimiter::new(RateLimitConfig::from(&config.cloud_connector));

    let manager = DispatchManager::new(
        repository,
        Arc::new(broker),
        Arc::new(limiter),
        DispatchManagerConfig::from(&config.dispatch),
    );

    let router = api::create_router(Arc::new(ApiState {
        manager: Arc::new(manager),
        request_timeout: config.cloud_connector.timeout(),
    }))
    .merge(api::metrics_router(registry));

    let listener = tokio::net::TcpListener::bind(config.api.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_address))?;
    info!("✓ API listening on {}", config.api.bind_address);

    let mut stop = shutdown.subscribe();
    Ok(shutdown.spawn_component("api", async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "API server failed");
        }
    }))
}

fn start_validator(
    config: &DispatcherConfigDto,
    nats: &NatsConnection,
    registry: &Registry,
    errors: mpsc::UnboundedSender<DomainError>,
    shutdown: &GracefulShutdown,
) -> anyhow::Result<JoinHandle<()>> {
    let fetcher = HttpArtifactFetcher::new(&config.storage)?;
    let producer = NatsProducer::new(nats.jetstream().clone());
    let stats = ValidatorStats::new(registry).context("Failed to register validator metrics")?;

    let validator = Validator::start(
        ValidatorConfig::new(&config.storage, &config.topics),
        Arc::new(fetcher),
        Arc::new(producer),
        Arc::new(stats),
        errors.clone(),
    )?;

    let consumer = NatsConsumer::new(
        nats.jetstream().clone(),
        ConsumerConfig::new(
            config.topics.validation_request.clone(),
            VALIDATOR_GROUP,
            config.nats.poll_timeout(),
        ),
    );

    let stop = shutdown.subscribe();
    Ok(shutdown.spawn_component("validator", async move {
        if let Err(e) = consumer.run(validator.intake.clone(), stop).await {
            let _ = errors.send(e.into());
        }
        validator.drain().await;
    }))
}

fn start_response_consumer(
    config: &DispatcherConfigDto,
    nats: &NatsConnection,
    repository: Arc<dyn RunRepository>,
    registry: &Registry,
    errors: mpsc::UnboundedSender<DomainError>,
    shutdown: &GracefulShutdown,
) -> anyhow::Result<JoinHandle<()>> {
    let metrics = ResponseConsumerMetrics::new(registry)
        .context("Failed to register response consumer metrics")?;
    let handler = Arc::new(ResponseConsumer::new(repository, Arc::new(metrics)));
    let consumer = NatsConsumer::new(
        nats.jetstream().clone(),
        ConsumerConfig::new(
            config.topics.updates.clone(),
            RESPONSE_CONSUMER_GROUP,
            config.nats.poll_timeout(),
        ),
    );

    let stop = shutdown.subscribe();
    Ok(shutdown.spawn_component("response-consumer", async move {
        if let Err(e) = consumer.run(handler, stop).await {
            let _ = errors.send(e.into());
        }
    }))
}
