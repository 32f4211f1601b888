// ============================================
// File: crates/lato-server/src/client.rs
// ============================================
//! # Tunnel Client
//!
//! ## Creation Reason
//! The client end of the wire protocol, used by integration tests and by
//! anything that needs to drive a server programmatically.
//!
//! ## Main Functionality
//! - `TunnelClient::connect`: Connects and reads the session setup record
//! - `send`: Encrypts a payload with the session key and sends it as a frame
//! - `wait_closed`: Waits for the server to close the connection
//!
//! ## Connection Flow
//! ```text
//! Client                                   Server
//!   │──────────── TCP connect ──────────────►│
//!   │◄─────── SessionSetup (config, key) ────│
//!   │──────── IV || ciphertext || tag ──────►│  (repeat)
//!   │◄──────────────── FIN ──────────────────│  (rejection, auth failure, shutdown)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The server never sends anything after the setup record
//! - A connection closed before the setup record means it was rejected
//!
//! ## Last Modified
//! v0.1.0 - Initial client

use std::net::{Ipv4Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use lato_core::crypto::{AesGcmFrameCrypto, FrameCrypto, SessionKey};
use lato_core::protocol::{decode_session_setup, ClientConfig};
use lato_transport::FramedStream;

use crate::error::{Result, ServerError};

/// Client side of a tunnel connection.
pub struct TunnelClient<S = TcpStream> {
    framed: FramedStream<S>,
    config: ClientConfig,
    key: SessionKey,
    crypto: AesGcmFrameCrypto,
}

impl TunnelClient<TcpStream> {
    /// Connects to `addr` and completes session setup.
    ///
    /// # Errors
    /// - `NoSessionSetup` if the server refused the connection
    /// - `Io` / `Transport` on network failures
    /// - `Core` if the setup record is malformed
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream).await
    }
}

impl<S> TunnelClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Completes session setup over an already connected stream.
    ///
    /// # Errors
    /// See [`TunnelClient::connect`].
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let record = framed.read_frame().await?.ok_or(ServerError::NoSessionSetup)?;
        let setup = decode_session_setup(&record)?;

        debug!(
            address = %setup.config.address,
            dns = setup.config.dns.len(),
            routes = setup.config.routes.len(),
            "Session setup received"
        );

        Ok(Self {
            framed,
            config: setup.config,
            key: setup.key,
            crypto: AesGcmFrameCrypto::new(),
        })
    }

    /// Returns the configuration the server assigned.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the assigned tunnel address.
    #[must_use]
    pub const fn address(&self) -> Ipv4Addr {
        self.config.address
    }

    /// Returns the session key.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Encrypts `payload` into a frame without sending it.
    ///
    /// # Errors
    /// Returns `Core` if encryption fails.
    pub fn seal(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.crypto.encrypt(&self.key, payload)?)
    }

    /// Encrypts and sends one payload.
    ///
    /// # Errors
    /// Returns `Core` or `Transport` errors.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let frame = self.seal(payload)?;
        self.send_frame(&frame).await
    }

    /// Sends an already built frame as is.
    ///
    /// # Errors
    /// Returns `Transport` errors.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.framed.write_frame(frame).await?;
        Ok(())
    }

    /// Waits until the server closes the connection.
    ///
    /// # Errors
    /// Returns `Transport` if the server sends a record or the read fails
    /// with anything other than a reset.
    pub async fn wait_closed(&mut self) -> Result<()> {
        match self.framed.read_frame().await {
            Ok(None) => Ok(()),
            Ok(Some(record)) => Err(ServerError::internal(format!(
                "unexpected {}-byte record from server",
                record.len()
            ))),
            Err(e) if e.is_disconnect() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Shuts down the write half, telling the server this client is done.
    ///
    /// # Errors
    /// Returns `Transport` if the shutdown fails.
    pub async fn close(mut self) -> Result<()> {
        self.framed.shutdown().await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for TunnelClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelClient")
            .field("address", &self.config.address)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lato_core::protocol::{encode_session_setup, SessionSetup};

    #[tokio::test]
    async fn test_from_stream_reads_setup() {
        let (client_end, server_end) = tokio::io::duplex(4096);
        let key = SessionKey::generate().unwrap();
        let config = ClientConfig::new(Ipv4Addr::new(10, 8, 0, 5), vec![], vec![]);

        let server = tokio::spawn(async move {
            let mut framed = FramedStream::new(server_end);
            let record = encode_session_setup(&SessionSetup::new(config, key)).unwrap();
            framed.write_frame(&record).await.unwrap();
            framed.read_frame().await.unwrap().unwrap()
        });

        let mut client = TunnelClient::from_stream(client_end).await.unwrap();
        assert_eq!(client.address(), Ipv4Addr::new(10, 8, 0, 5));

        client.send(b"hello").await.unwrap();
        let frame = server.await.unwrap();
        let plaintext = lato_core::crypto::decrypt_frame(client.key(), &frame).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[tokio::test]
    async fn test_closed_before_setup_is_rejection() {
        let (client_end, server_end) = tokio::io::duplex(64);
        drop(server_end);

        let err = TunnelClient::from_stream(client_end).await.unwrap_err();
        assert!(matches!(err, ServerError::NoSessionSetup));
        assert!(err.is_rejection());
    }
}
