// ============================================
// File: crates/lato-transport/src/tcp.rs
// ============================================
//! # TCP Transport Implementation
//!
//! ## Creation Reason
//! Provides the TCP listener tunnel clients connect to, wrapping Tokio's
//! listener with our `Listener` trait.
//!
//! ## Main Functionality
//! - `TcpTransport`: Bound listener implementing `Listener`
//! - Socket binding with address reuse
//! - `TCP_NODELAY` on accepted streams
//!
//! ## Design Choices
//! - SO_REUSEADDR for quick rebinding after restart
//! - socket2 for socket options before `listen`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ports below 1024 need CAP_NET_BIND_SERVICE
//! - Dropping the transport closes the listening socket
//!
//! ## Last Modified
//! v0.1.0 - TCP listener

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ConnectionInfo, Listener};

/// Pending-connection queue length passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================
// TcpTransport
// ============================================

/// TCP listener for tunnel clients.
///
/// # Example
/// ```ignore
/// use lato_transport::{Listener, TcpTransport};
///
/// let transport = TcpTransport::bind("0.0.0.0:1194").await?;
/// let (stream, info) = transport.accept().await?;
/// ```
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Creates a listener bound to an address string.
    ///
    /// # Errors
    /// - `InvalidAddress`: If `addr` does not parse
    /// - `AddressInUse` / `BindFailed`: If binding fails
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self> {
        let addr_str = addr.as_ref();
        let socket_addr: SocketAddr =
            addr_str
                .parse()
                .map_err(|_| TransportError::InvalidAddress {
                    addr: addr_str.to_string(),
                })?;

        Self::bind_addr(socket_addr).await
    }

    /// Creates a listener bound to a socket address.
    ///
    /// # Socket Options
    /// - `SO_REUSEADDR`: Enabled for quick rebinding
    /// - Non-blocking: Required for async operations
    ///
    /// # Errors
    /// Returns error if binding or listening fails.
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self> {
        info!("Binding TCP listener to {}", addr);

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("creating TCP socket", e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;

        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse { addr }
            } else {
                TransportError::bind_failed(addr, e.to_string())
            }
        })?;

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::bind_failed(addr, e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to Tokio listener", e))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        info!("TCP listener bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }
}

#[async_trait]
impl Listener for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> Result<(TcpStream, ConnectionInfo)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|source| TransportError::AcceptFailed { source })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        trace!(peer = %peer, "Accepted TCP connection");
        Ok((stream, ConnectionInfo::new(peer)))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_and_local_addr() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        assert_eq!(addr.ip(), std::net::Ipv4Addr::LOCALHOST);
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_accept_loopback() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
            stream.local_addr().unwrap()
        });

        let (mut stream, info) = transport.accept().await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"hello");
        assert_eq!(info.peer, client.await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let result = TcpTransport::bind("not-an-address").await;
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let first = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two listeners on one port
        let second = TcpTransport::bind_addr(addr).await;
        assert!(matches!(
            second,
            Err(TransportError::AddressInUse { .. } | TransportError::BindFailed { .. })
        ));
    }
}
