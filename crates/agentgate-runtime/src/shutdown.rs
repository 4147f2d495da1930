//! Coordinated shutdown.
//!
//! The server hands [`ShutdownController::token`] children to the gateway and
//! to the HTTP listener. On Ctrl+C or SIGTERM the controller moves through
//! its phases, cancels the root token and runs one drain future (closing
//! worker connections) bounded by a timeout.
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//! let gateway = Gateway::with_cancellation(config, registry, store, shutdown.token());
//!
//! shutdown_signal_with_controller(shutdown.clone()).await;
//! shutdown.drain(gateway.shutdown()).await;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time allowed for draining connections.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Signal received, listener stops accepting
    Stopping,
    /// Closing worker connections
    Draining,
    /// Done
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Drives the gateway's shutdown sequence.
#[derive(Debug)]
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase: watch::Sender<ShutdownPhase>,
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Controller with the default drain timeout.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Controller with a custom drain timeout.
    #[must_use]
    pub fn with_timeout(drain_timeout: Duration) -> Arc<Self> {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase,
            drain_timeout,
        })
    }

    /// Child token, cancelled when shutdown begins.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    /// Resolves once shutdown has started.
    pub async fn stopped(&self) {
        self.cancel_token.cancelled().await;
    }

    /// Enter `Stopping` and cancel every token. Returns `false` if shutdown
    /// had already begun.
    pub fn begin(&self) -> bool {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == ShutdownPhase::Running {
                *phase = ShutdownPhase::Stopping;
                true
            } else {
                false
            }
        });

        if started {
            info!(phase = %ShutdownPhase::Stopping, "Shutdown phase changed");
            self.cancel_token.cancel();
        } else {
            debug!("Shutdown already initiated");
        }
        started
    }

    /// Run `drain` under the drain timeout, then mark the controller
    /// terminated.
    ///
    /// Starts shutdown first if nothing else did. Returns `false` when the
    /// timeout cut the drain short.
    pub async fn drain<F>(&self, drain: F) -> bool
    where
        F: Future<Output = ()>,
    {
        self.begin();
        self.set_phase(ShutdownPhase::Draining);

        let completed = match tokio::time::timeout(self.drain_timeout, drain).await {
            Ok(()) => {
                info!("All connections drained");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain timeout exceeded, terminating"
                );
                false
            }
        };

        self.set_phase(ShutdownPhase::Terminated);
        completed
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for a signal (or a programmatic [`ShutdownController::begin`]) and
/// start shutdown. Suitable for axum's `with_graceful_shutdown`.
pub async fn shutdown_signal_with_controller(controller: Arc<ShutdownController>) {
    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        _ = controller.stopped() => {}
    }
    controller.begin();
}
