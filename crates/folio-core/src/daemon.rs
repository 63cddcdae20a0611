//! Core daemon process: startup, periodic guard sweeps, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use folio_config::AppConfig;
use folio_guard::AbuseGuard;

use crate::http::{AppState, serve};
use crate::notify::Dispatcher;

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The folio contact daemon.
pub struct Daemon {
    config: AppConfig,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
}

impl Daemon {
    /// Create a daemon with a system-clock guard and the configured channels.
    pub fn new(config: AppConfig) -> Result<Self, DaemonError> {
        let guard = Arc::new(AbuseGuard::with_system_clock(config.guard_config()));
        let dispatcher = Dispatcher::from_config(&config.notify);
        Self::with_parts(config, guard, dispatcher)
    }

    /// Create a daemon around an existing guard and dispatcher.
    pub fn with_parts(
        config: AppConfig,
        guard: Arc<AbuseGuard>,
        dispatcher: Dispatcher,
    ) -> Result<Self, DaemonError> {
        let state = Arc::new(AppState::new(&config, guard, dispatcher)?);
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            config,
            state,
            shutdown_tx,
            _shutdown_rx,
        })
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let addr = format!(
            "{}:{}",
            self.config.server.listen_addr, self.config.server.listen_port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Startup(format!("cannot bind {addr}: {e}")))?;
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener until shutdown or Ctrl-C.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), DaemonError> {
        info!(
            version = %crate::build_info::version_string(),
            environment = %self.config.server.environment,
            channels = ?self.state.dispatcher.sink_names(),
            "folio daemon starting"
        );

        let sweeper = self.spawn_sweeper();
        let server = serve(listener, self.state.clone(), self.shutdown_tx.subscribe());
        tokio::pin!(server);

        let result = tokio::select! {
            res = &mut server => res,
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                self.shutdown();
                (&mut server).await
            }
        };

        // Stops the sweeper when the server exited on its own.
        self.shutdown();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        info!("Daemon stopped");
        result.map_err(DaemonError::from)
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The guard shared with the request handlers.
    pub fn guard(&self) -> &Arc<AbuseGuard> {
        &self.state.guard
    }

    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let every = self.config.guard.sweep_interval_secs;
        if every == 0 {
            info!("Guard sweeps disabled");
            return None;
        }

        let guard = self.state.guard.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(every));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        guard.sweep();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        }))
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error("validator patterns failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
