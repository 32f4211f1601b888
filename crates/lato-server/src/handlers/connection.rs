// ============================================
// File: crates/lato-server/src/handlers/connection.rs
// ============================================
//! # Connection Handler
//!
//! ## Creation Reason
//! Owns one accepted connection from admission to teardown: creates the
//! session, sends the setup record, then decrypts and forwards every frame
//! until something ends the connection.
//!
//! ## Main Functionality
//! - `ConnectionContext`: Shared collaborators (registry, processor, crypto, authorizer)
//! - `ConnectionHandler`: Per-connection state machine driven by `run()`
//! - `ConnectionState` / `ConnectionEvent` / `CloseReason`
//!
//! ## State Machine
//! ```text
//!              Connected
//! Connecting ────────────► ClientConfigSent ──FrameReceived──► Active ◄─┐
//!     │                         │                                │  │   │
//!     │ rejected                │ Error / Closed                 │  └───┘
//!     ▼                         ▼                                ▼
//!  Closing ◄─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//!   Closed   (socket shut down, session destroyed)
//! ```
//!
//! ## Event Sources
//! - Peer records (`FrameReceived`, EOF → `Closed`)
//! - Server shutdown signal → `Closed(ServerShutdown)`
//! - Session close signal from the registry → `Closed(SessionClosed)`
//! - Idle timer → `Closed(IdleTimeout)`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `dispatch` is the only place state changes
//! - The session guard destroys the session on drop, so an aborted task
//!   still releases its address
//! - A frame that fails authentication closes the connection; nothing from
//!   it reaches the processor
//! - A processor error drops that frame only
//!
//! ## Last Modified
//! v0.1.0 - Connection state machine

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use lato_core::crypto::{AesGcmFrameCrypto, FrameCrypto};
use lato_core::protocol::{encode_session_setup, SessionSetup};
use lato_transport::{ConnectionInfo, FramedStream, DEFAULT_MAX_FRAME_SIZE};

use super::packet::{LoggingProcessor, PacketProcessor};
use crate::authz::{AllowAll, Authorizer};
use crate::error::{Result, ServerError};
use crate::services::{Session, SessionRegistry};

/// Upper bound on the socket shutdown during close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================
// State, Events and Close Reasons
// ============================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, session not yet created.
    Connecting,
    /// Session setup record sent, no frame received yet.
    ClientConfigSent,
    /// At least one frame authenticated.
    Active,
    /// Tearing down.
    Closing,
    /// Socket closed and session destroyed.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::ClientConfigSent => write!(f, "client_config_sent"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Inputs to the connection state machine.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The connection was accepted.
    Connected,
    /// A complete record arrived from the peer.
    FrameReceived(Bytes),
    /// Something failed.
    Error(ServerError),
    /// The connection must close.
    Closed(CloseReason),
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the stream at a record boundary.
    PeerDisconnected,
    /// Refused at admission (pool, limit, duplicate, authorization).
    Rejected,
    /// A frame failed authentication.
    AuthenticationFailed,
    /// Read or write failure, or a malformed record.
    Transport,
    /// No frame within the idle timeout.
    IdleTimeout,
    /// The session was closed through the registry.
    SessionClosed,
    /// The server is shutting down.
    ServerShutdown,
    /// Any other failure.
    Internal,
}

impl CloseReason {
    fn from_error(error: &ServerError) -> Self {
        if error.is_authentication_failure() {
            Self::AuthenticationFailed
        } else if error.is_rejection() {
            Self::Rejected
        } else {
            match error {
                ServerError::ShuttingDown => Self::ServerShutdown,
                ServerError::Transport(_) | ServerError::Io(_) => Self::Transport,
                _ => Self::Internal,
            }
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::PeerDisconnected => "peer_disconnected",
            Self::Rejected => "rejected",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Transport => "transport_error",
            Self::IdleTimeout => "idle_timeout",
            Self::SessionClosed => "session_closed",
            Self::ServerShutdown => "server_shutdown",
            Self::Internal => "internal_error",
        };
        f.write_str(reason)
    }
}

// ============================================
// ConnectionContext
// ============================================

/// Collaborators shared by every connection handler.
pub struct ConnectionContext {
    registry: Arc<SessionRegistry>,
    processor: Arc<dyn PacketProcessor>,
    crypto: Arc<dyn FrameCrypto>,
    authorizer: Arc<dyn Authorizer>,
    admission_resource: Option<String>,
    idle_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl ConnectionContext {
    /// Creates a context with the default processor and crypto, no
    /// admission check and no idle timeout.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            processor: Arc::new(LoggingProcessor::new()),
            crypto: Arc::new(AesGcmFrameCrypto::new()),
            authorizer: Arc::new(AllowAll),
            admission_resource: None,
            idle_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the packet processor.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn PacketProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Sets the frame cipher.
    #[must_use]
    pub fn with_crypto(mut self, crypto: Arc<dyn FrameCrypto>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Checks `check_permission(peer_ip, resource)` before creating a
    /// session. `None` disables the check.
    #[must_use]
    pub fn with_admission(
        mut self,
        authorizer: Arc<dyn Authorizer>,
        resource: Option<String>,
    ) -> Self {
        self.authorizer = authorizer;
        self.admission_resource = resource;
        self
    }

    /// Closes connections that send nothing for `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the largest record accepted or sent.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("registry", &self.registry)
            .field("admission_resource", &self.admission_resource)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

// ============================================
// SessionGuard
// ============================================

/// Destroys the session when dropped.
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.destroy_session(&self.session);
    }
}

// ============================================
// ConnectionHandler
// ============================================

/// Drives one connection through its lifecycle.
pub struct ConnectionHandler<S> {
    ctx: Arc<ConnectionContext>,
    framed: FramedStream<S>,
    info: ConnectionInfo,
    shutdown: watch::Receiver<bool>,
    state: ConnectionState,
    guard: Option<SessionGuard>,
    close_reason: Option<CloseReason>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a handler for an accepted stream.
    ///
    /// `shutdown` flips to `true` when the server stops.
    pub fn new(
        stream: S,
        info: ConnectionInfo,
        ctx: Arc<ConnectionContext>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let framed = FramedStream::with_max_frame_size(stream, ctx.max_frame_size);
        Self {
            ctx,
            framed,
            info,
            shutdown,
            state: ConnectionState::Connecting,
            guard: None,
            close_reason: None,
        }
    }

    /// Returns the current state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    fn session(&self) -> Option<&Arc<Session>> {
        self.guard.as_ref().map(|g| &g.session)
    }

    /// Runs the connection to completion and returns why it ended.
    pub async fn run(mut self) -> CloseReason {
        let mut event = ConnectionEvent::Connected;
        loop {
            let follow_up = self.dispatch(event).await;
            if self.state == ConnectionState::Closed {
                break;
            }
            event = match follow_up {
                Some(event) => event,
                None => self.next_event().await,
            };
        }
        self.close_reason.unwrap_or(CloseReason::Internal)
    }

    /// Applies one event. May return a follow-up event to apply immediately.
    async fn dispatch(&mut self, event: ConnectionEvent) -> Option<ConnectionEvent> {
        match event {
            ConnectionEvent::Connected => {
                info!(peer = %self.info.peer, "Connection accepted");

                let mut shutdown = self.shutdown.clone();
                let opened = tokio::select! {
                    biased;
                    () = wait_for_signal(&mut shutdown) => Err(ServerError::ShuttingDown),
                    result = self.open_session() => result,
                };

                match opened {
                    Ok(()) => {
                        self.state = ConnectionState::ClientConfigSent;
                        None
                    }
                    Err(e) => Some(ConnectionEvent::Error(e)),
                }
            }
            ConnectionEvent::FrameReceived(frame) => self.handle_frame(frame).await,
            ConnectionEvent::Error(e) => {
                let reason = CloseReason::from_error(&e);
                if e.is_rejection() {
                    info!(peer = %self.info.peer, error = %e, "Connection rejected");
                } else if e.is_authentication_failure() {
                    warn!(peer = %self.info.peer, "Frame failed authentication");
                } else {
                    warn!(peer = %self.info.peer, state = %self.state, error = %e, "Connection error");
                }
                self.close(reason).await;
                None
            }
            ConnectionEvent::Closed(reason) => {
                self.close(reason).await;
                None
            }
        }
    }

    /// Admission, session creation and the setup record.
    async fn open_session(&mut self) -> Result<()> {
        let peer = self.info.peer;

        if let Some(resource) = self.ctx.admission_resource.as_deref() {
            let user_id = peer.ip().to_string();
            let allowed = match self.ctx.authorizer.check_permission(&user_id, resource).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Admission check failed");
                    false
                }
            };
            if !allowed {
                return Err(ServerError::Unauthorized {
                    peer,
                    resource: resource.to_string(),
                });
            }
        }

        let session = self.ctx.registry.create(peer)?;
        self.guard = Some(SessionGuard {
            registry: Arc::clone(&self.ctx.registry),
            session: Arc::clone(&session),
        });

        let setup = SessionSetup::new(session.client_config().clone(), session.key().clone());
        let mut record = encode_session_setup(&setup)?;
        let sent = self.framed.write_frame(&record).await;
        record[..].zeroize();
        sent?;

        debug!(
            session_id = %session.id,
            address = %session.address,
            "Session setup sent"
        );
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Bytes) -> Option<ConnectionEvent> {
        let Some(session) = self.session().cloned() else {
            return Some(ConnectionEvent::Error(ServerError::internal(
                "frame received without a session",
            )));
        };

        let plaintext = match self.ctx.crypto.decrypt(session.key(), &frame) {
            Ok(plaintext) => plaintext,
            Err(e) => return Some(ConnectionEvent::Error(e.into())),
        };

        self.state = ConnectionState::Active;
        session.touch();
        session.stats.record_rx(plaintext.len() as u64);

        let len = plaintext.len();
        match self.ctx.processor.process(&session, Bytes::from(plaintext)).await {
            Ok(()) => {
                debug!(session_id = %session.id, len, "Frame processed");
            }
            Err(e) => {
                session.stats.record_dropped();
                warn!(session_id = %session.id, len, error = %e, "Packet processor failed, frame dropped");
            }
        }
        None
    }

    /// Waits for the next event from the peer, the server or the registry.
    async fn next_event(&mut self) -> ConnectionEvent {
        let Some(session) = self.session().cloned() else {
            return ConnectionEvent::Error(ServerError::internal("no session to read for"));
        };

        let idle_timeout = self.ctx.idle_timeout;
        let framed = &mut self.framed;
        let shutdown = &mut self.shutdown;

        let read = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, framed.read_frame()).await.ok(),
                None => Some(framed.read_frame().await),
            }
        };

        tokio::select! {
            biased;
            () = wait_for_signal(shutdown) => ConnectionEvent::Closed(CloseReason::ServerShutdown),
            () = session.closed() => ConnectionEvent::Closed(CloseReason::SessionClosed),
            read = read => match read {
                None => ConnectionEvent::Closed(CloseReason::IdleTimeout),
                Some(Ok(Some(frame))) => ConnectionEvent::FrameReceived(frame),
                Some(Ok(None)) => ConnectionEvent::Closed(CloseReason::PeerDisconnected),
                Some(Err(e)) => ConnectionEvent::Error(e.into()),
            },
        }
    }

    /// Shuts the socket down and destroys the session. Idempotent.
    async fn close(&mut self, reason: CloseReason) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Closed) {
            return;
        }
        self.state = ConnectionState::Closing;
        self.close_reason = Some(reason);

        match tokio::time::timeout(CLOSE_TIMEOUT, self.framed.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %self.info.peer, error = %e, "Socket shutdown failed"),
            Err(_) => debug!(peer = %self.info.peer, "Socket shutdown timed out"),
        }

        let session_id = self.session().map(|s| s.id);
        drop(self.guard.take());
        self.state = ConnectionState::Closed;

        let duration_ms = u64::try_from(self.info.age().as_millis()).unwrap_or(u64::MAX);
        match session_id {
            Some(session_id) => info!(
                peer = %self.info.peer,
                session_id = %session_id,
                reason = %reason,
                duration_ms,
                "Connection closed"
            ),
            None => info!(peer = %self.info.peer, reason = %reason, duration_ms, "Connection closed"),
        }
    }
}

impl<S> fmt::Debug for ConnectionHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("peer", &self.info.peer)
            .field("state", &self.state)
            .field("session", &self.guard.as_ref().map(|g| g.session.id))
            .finish_non_exhaustive()
    }
}

/// Resolves once the watched flag is `true`. Never resolves if the sender
/// is dropped without setting it.
pub(crate) async fn wait_for_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================
// Tests
// ============================================
