// ============================================
// File: crates/lato-server/src/server.rs
// ============================================
//! # Tunnel Server
//!
//! ## Creation Reason
//! Owns every component of the tunnel server and runs its lifecycle:
//! firewall bootstrap, listener, accept loop, graceful and forced shutdown.
//!
//! ## Main Functionality
//! - `TunnelServer`: Component wiring, `start()` / `stop()` / `run()`
//! - `ShutdownReport`: How many connections closed in time and how many were aborted
//! - `shutdown_signal()`: Resolves on SIGINT or SIGTERM
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TunnelServer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  start():  bootstrap ──► bind ──► spawn accept loop         │
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                 Accept Loop                          │   │
//! │  │   accept ──► spawn ConnectionHandler into JoinSet    │   │
//! │  │   reap finished handlers                             │   │
//! │  │   shutdown signal ──► drop listener, hand JoinSet    │   │
//! │  │                       back to stop()                 │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                                                             │
//! │  stop():   signal ──► wait grace period ──► abort rest      │
//! │                                                             │
//! │  ┌──────────────┐ ┌─────────────┐ ┌──────────────────────┐ │
//! │  │ AddressPool  │ │  Session    │ │ Authorizer /         │ │
//! │  │              │◄┤  Registry   │ │ PacketProcessor      │ │
//! │  └──────────────┘ └─────────────┘ └──────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Bootstrap failure is logged and ignored unless `firewall.fail_on_error`
//! - Listener failure is fatal (`ServerError::Listener`)
//! - Aborted handlers destroy their sessions through the drop guard
//! - `stop()` on a server that is not running returns an empty report
//!
//! ## Last Modified
//! v0.1.0 - TCP tunnel server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use lato_transport::{Listener, TcpTransport, TransportError};

use crate::authz::{self, Authorizer};
use crate::bootstrap::{self, NetworkBootstrap};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handlers::connection::wait_for_signal;
use crate::handlers::{
    CloseReason, ConnectionContext, ConnectionHandler, LoggingProcessor, PacketProcessor,
};
use crate::services::{AddressPool, SessionRegistry};

/// Pause after a transient accept failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Pause after an accept failure that is not expected to clear quickly.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ============================================
// ShutdownReport
// ============================================

/// Outcome of [`TunnelServer::stop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections that closed within the grace period.
    pub graceful: usize,
    /// Connections aborted at the deadline.
    pub forced: usize,
}

// ============================================
// TunnelServer
// ============================================

/// The tunnel server.
///
/// # Lifecycle
/// 1. Create with `TunnelServer::new(config)`
/// 2. `start().await` binds and begins accepting
/// 3. `stop().await` shuts down, or use `run()` for both plus signal handling
pub struct TunnelServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    processor: Arc<dyn PacketProcessor>,
    authorizer: Arc<dyn Authorizer>,
    bootstrap: Arc<dyn NetworkBootstrap>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<JoinSet<CloseReason>>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TunnelServer {
    /// Builds a server and its components from `config`.
    ///
    /// # Errors
    /// Returns a config error if `config` is invalid or the pool range is
    /// unusable, or `Authorization` if the API client cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(AddressPool::from_config(&config.pool)?);
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&pool),
            config.client.clone(),
            config.limits.max_sessions,
        ));
        let authorizer = authz::from_config(&config.authorization)?;
        let bootstrap = bootstrap::from_config(&config.firewall);
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            pool_capacity = pool.capacity(),
            max_sessions = config.limits.max_sessions,
            "Services initialized"
        );

        Ok(Self {
            config,
            registry,
            processor: Arc::new(LoggingProcessor::new()),
            authorizer,
            bootstrap,
            running: AtomicBool::new(false),
            shutdown_tx,
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    /// Replaces the packet processor. Takes effect on the next `start`.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn PacketProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Replaces the network bootstrap.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn NetworkBootstrap>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Replaces the authorizer used for admission checks.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Returns `true` between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Installs firewall rules, binds the listener and starts accepting.
    ///
    /// # Returns
    /// The bound address (useful with port 0).
    ///
    /// # Errors
    /// - `AlreadyRunning` if started twice
    /// - `Bootstrap` if rule installation fails and `firewall.fail_on_error` is set
    /// - `Listener` if the listener cannot be bound
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        match self.bind().await {
            Ok((listener, local_addr)) => {
                self.shutdown_tx.send_replace(false);
                let ctx = Arc::new(self.connection_context());
                let task = tokio::spawn(accept_loop(listener, ctx, self.shutdown_tx.subscribe()));

                *self.accept_task.lock() = Some(task);
                *self.local_addr.lock() = Some(local_addr);

                info!(
                    listen_addr = %local_addr,
                    version = env!("CARGO_PKG_VERSION"),
                    "Tunnel server started"
                );
                Ok(local_addr)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn bind(&self) -> Result<(TcpTransport, SocketAddr)> {
        if let Err(e) = self.bootstrap.install().await {
            if self.config.firewall.fail_on_error {
                error!(error = %e, "Network bootstrap failed");
                return Err(e);
            }
            warn!(error = %e, "Network bootstrap failed, continuing without it");
        }

        let addr = self.config.network.listen_addr;
        let listener = TcpTransport::bind_addr(addr)
            .await
            .map_err(|source| ServerError::Listener { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Listener { addr, source })?;

        Ok((listener, local_addr))
    }

    fn connection_context(&self) -> ConnectionContext {
        let admission = self
            .config
            .authorization
            .admission_resource()
            .map(str::to_string);

        ConnectionContext::new(Arc::clone(&self.registry))
            .with_processor(Arc::clone(&self.processor))
            .with_admission(Arc::clone(&self.authorizer), admission)
            .with_idle_timeout(self.config.limits.idle_timeout())
            .with_max_frame_size(self.config.limits.max_frame_size)
    }

    /// Stops accepting, signals every connection to close, waits up to the
    /// grace period and aborts the rest.
    ///
    /// # Errors
    /// Currently infallible; the `Result` is kept for callers that chain it
    /// after `start`.
    pub async fn stop(&self) -> Result<ShutdownReport> {
        let Some(accept_task) = self.accept_task.lock().take() else {
            debug!("Stop requested but server is not running");
            return Ok(ShutdownReport::default());
        };

        let grace = self.config.shutdown.grace_period();
        info!(
            sessions = self.registry.count(),
            grace_period_secs = grace.as_secs(),
            "Shutting down tunnel server"
        );
        self.shutdown_tx.send_replace(true);

        let mut tasks = match accept_task.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Accept loop failed");
                JoinSet::new()
            }
        };

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => report.graceful += 1,
                Ok(None) => break,
                Err(_) => {
                    report.forced = tasks.len();
                    warn!(remaining = report.forced, "Grace period expired, aborting connections");
                    break;
                }
            }
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        *self.local_addr.lock() = None;
        self.running.store(false, Ordering::SeqCst);

        info!(
            graceful = report.graceful,
            forced = report.forced,
            sessions = self.registry.count(),
            "Tunnel server stopped"
        );
        Ok(report)
    }

    /// Starts, waits for SIGINT or SIGTERM, then stops.
    ///
    /// # Errors
    /// Propagates `start` errors and signal handler installation failures.
    pub async fn run(&self) -> Result<ShutdownReport> {
        self.start().await?;
        if let Err(e) = shutdown_signal().await {
            self.stop().await?;
            return Err(e);
        }
        self.stop().await
    }
}

impl std::fmt::Debug for TunnelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelServer")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

// ============================================
// Accept Loop
// ============================================

/// Accepts connections until shutdown; returns the still-running handlers.
async fn accept_loop(
    listener: TcpTransport,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinSet<CloseReason> {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = wait_for_signal(&mut shutdown) => {
                debug!("Accept loop received shutdown signal");
                break;
            }
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "Connection task panicked");
                    }
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, info)) => {
                    let handler = ConnectionHandler::new(
                        stream,
                        info,
                        Arc::clone(&ctx),
                        shutdown.clone(),
                    );
                    tasks.spawn(handler.run());
                }
                Err(e) => tokio::time::sleep(accept_backoff(&e)).await,
            },
        }
    }

    debug!(connections = tasks.len(), "Accept loop exiting");
    tasks
}

/// Logs a failed accept and returns how long to wait before the next one.
fn accept_backoff(err: &TransportError) -> Duration {
    if err.is_retryable() {
        warn!(error = %err, "Accept failed, retrying");
        ACCEPT_BACKOFF
    } else {
        error!(error = %err, "Accept failed");
        ACCEPT_ERROR_BACKOFF
    }
}

// ============================================
// Signals
// ============================================

/// Resolves when the process receives SIGINT or SIGTERM.
///
/// # Errors
/// Returns `Io` if a signal handler cannot be installed.
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::NoopBootstrap;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.firewall.enabled = false;
        config.shutdown.grace_period_secs = 1;
        config
    }

    struct FailingBootstrap;

    #[async_trait::async_trait]
    impl NetworkBootstrap for FailingBootstrap {
        async fn install(&self) -> Result<()> {
            Err(ServerError::bootstrap("iptables", "permission denied"))
        }
    }

    #[tokio::test]
    async fn test_start_stop_without_connections() {
        let server = TunnelServer::new(test_config()).unwrap();
        let addr = server.start().await.unwrap();

        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert!(server.is_running());

        let report = server.stop().await.unwrap();
        assert_eq!(report, ShutdownReport::default());
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[test]
    fn test_accept_backoff_by_error_kind() {
        let reset = TransportError::AcceptFailed {
            source: std::io::Error::from(std::io::ErrorKind::ConnectionReset),
        };
        assert_eq!(accept_backoff(&reset), ACCEPT_BACKOFF);

        let denied = TransportError::AcceptFailed {
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(accept_backoff(&denied), ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let server = TunnelServer::new(test_config()).unwrap();
        server.start().await.unwrap();

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let server = TunnelServer::new(test_config()).unwrap();
        assert_eq!(server.stop().await.unwrap(), ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_logged_by_default() {
        let server = TunnelServer::new(test_config())
            .unwrap()
            .with_bootstrap(Arc::new(FailingBootstrap));

        server.start().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_fatal_when_configured() {
        let mut config = test_config();
        config.firewall.fail_on_error = true;
        let server = TunnelServer::new(config)
            .unwrap()
            .with_bootstrap(Arc::new(FailingBootstrap));

        assert!(matches!(server.start().await, Err(ServerError::Bootstrap { .. })));
        assert!(!server.is_running());

        // A working bootstrap can be swapped in afterwards
        let server = server.with_bootstrap(Arc::new(NoopBootstrap));
        server.start().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_failure_is_fatal() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.network.listen_addr = occupied.local_addr().unwrap();

        let server = TunnelServer::new(config).unwrap();
        let err = server.start().await.unwrap_err();

        assert!(matches!(err, ServerError::Listener { .. }));
        assert!(!server.is_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.limits.max_sessions = 0;
        assert!(matches!(
            TunnelServer::new(config),
            Err(ServerError::ConfigInvalid { .. })
        ));
    }
}
