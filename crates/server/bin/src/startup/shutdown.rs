//! Graceful Shutdown Module
//!
//! Coordinated shutdown for every module of the process:
//! - Signal handlers (SIGTERM, SIGINT)
//! - Process error channel (a fatal component error stops everything)
//! - Bounded draining of in-flight work

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dispatcher_server_domain::DomainError;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Reason for shutdown
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// SIGTERM signal received
    SigTerm,
    /// SIGINT signal received (Ctrl+C)
    SigInt,
    /// A component reported a fatal error
    ComponentFailed(String),
    /// A component task ended on its own
    ComponentExited(String),
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::SigTerm => write!(f, "SIGTERM"),
            ShutdownReason::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownReason::ComponentFailed(reason) => write!(f, "Component failed: {}", reason),
            ShutdownReason::ComponentExited(name) => write!(f, "Component exited: {}", name),
        }
    }
}

/// Shutdown state
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownState {
    Running,
    ShuttingDown(ShutdownReason),
}

/// Graceful shutdown coordinator
///
/// Components subscribe for a stop notification before they start. The
/// first trigger wins; later triggers are ignored.
#[derive(Clone)]
pub struct GracefulShutdown {
    stop_tx: Arc<broadcast::Sender<()>>,
    state_tx: Arc<watch::Sender<ShutdownState>>,
    timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(timeout: Duration) -> Self {
        let (stop_tx, _) = broadcast::channel(16);
        let (state_tx, _) = watch::channel(ShutdownState::Running);

        Self {
            stop_tx: Arc::new(stop_tx),
            state_tx: Arc::new(state_tx),
            timeout,
        }
    }

    /// Receiver notified once shutdown starts
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Trigger shutdown programmatically
    pub fn shutdown(&self, reason: ShutdownReason) {
        let first = self.state_tx.send_if_modified(|state| match state {
            ShutdownState::Running => {
                *state = ShutdownState::ShuttingDown(reason.clone());
                true
            }
            ShutdownState::ShuttingDown(_) => false,
        });

        if first {
            info!("Triggering shutdown: {}", reason);
            let _ = self.stop_tx.send(());
        }
    }

    /// Wait until shutdown has been triggered and return why
    pub async fn wait_for_signal(&self) -> ShutdownReason {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            if let ShutdownState::ShuttingDown(reason) = &*state_rx.borrow_and_update() {
                return reason.clone();
            }
            if state_rx.changed().await.is_err() {
                return ShutdownReason::ComponentExited("shutdown coordinator".to_string());
            }
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state_tx.borrow().clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(*self.state_tx.borrow(), ShutdownState::ShuttingDown(_))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Turn every error received on `errors` into a shutdown
    pub fn watch_errors(&self, mut errors: mpsc::UnboundedReceiver<DomainError>) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Some(err) = errors.recv().await {
                error!(error = %err, "Fatal component error");
                coordinator.shutdown(ShutdownReason::ComponentFailed(err.to_string()));
            }
        });
    }

    /// Spawn a component; its completion before shutdown stops the process
    pub fn spawn_component<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            task.await;
            if !coordinator.is_shutting_down() {
                warn!(component = name, "Component stopped unexpectedly");
                coordinator.shutdown(ShutdownReason::ComponentExited(name.to_string()));
            }
        })
    }

    /// Wait for the components to finish, bounded by the shutdown timeout
    pub async fn drain(&self, components: Vec<JoinHandle<()>>) -> bool {
        info!(
            "Starting graceful shutdown sequence with {} components",
            components.len()
        );

        let wait_all = async {
            for component in components {
                if let Err(e) = component.await {
                    error!(error = %e, "Component task panicked");
                }
            }
        };

        match timeout(self.timeout, wait_all).await {
            Ok(()) => {
                info!("All components shut down gracefully");
                true
            }
            Err(_) => {
                warn!("Shutdown sequence timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

/// Start signal handler that triggers graceful shutdown
pub fn start_signal_handler(coordinator: &GracefulShutdown) {
    let coordinator = coordinator.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to register ctrl-c handler: {}", e);
                std::future::pending::<()>().await;
            }
            ShutdownReason::SigInt
        };

        let term = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            ShutdownReason::SigTerm
        };

        let reason = tokio::select! {
            reason = ctrl_c => reason,
            reason = term => reason,
        };
        coordinator.shutdown(reason);
    });
}
