// ============================================
// File: crates/lato-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the listener abstraction the tunnel server accepts connections
//! through, so the accept loop can be driven by other stream sources.
//!
//! ## Main Functionality
//! - `Listener`: Accepts byte streams from peers
//! - `ConnectionInfo`: Metadata about an accepted connection
//!
//! ## ⚠️ Important Note for Next Developer
//! - `accept` must be cancel-safe; the server races it against shutdown
//! - Implementations must be Send + Sync for use in async contexts
//!
//! ## Last Modified
//! v0.1.0 - Stream listener trait

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

// ============================================
// ConnectionInfo
// ============================================

/// Metadata about an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    /// Remote address (IP and port).
    pub peer: SocketAddr,
    /// When the connection was accepted.
    pub accepted_at: Instant,
}

impl ConnectionInfo {
    /// Creates a new `ConnectionInfo` stamped with the current time.
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            accepted_at: Instant::now(),
        }
    }

    /// Returns how long ago the connection was accepted.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.accepted_at.elapsed()
    }
}

// ============================================
// Listener Trait
// ============================================

/// Abstract interface for a stream listener.
///
/// # Example
/// ```ignore
/// async fn serve<L: Listener>(listener: &L) -> Result<()> {
///     loop {
///         let (stream, info) = listener.accept().await?;
///         tokio::spawn(handle(stream, info.peer));
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync {
    /// Stream type yielded for each connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Waits for the next inbound connection.
    ///
    /// # Errors
    /// Returns `AcceptFailed` if the OS rejects the accept.
    async fn accept(&self) -> Result<(Self::Stream, ConnectionInfo)>;

    /// Returns the local address the listener is bound to.
    ///
    /// # Errors
    /// Returns error if address cannot be determined.
    fn local_addr(&self) -> Result<SocketAddr>;
}
