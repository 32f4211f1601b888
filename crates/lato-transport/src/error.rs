// ============================================
// File: crates/lato-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the TCP listener and the record framing that
//! runs on every accepted stream.
//!
//! ## Error Categories
//! 1. **Listener Errors**: Bind and accept failures
//! 2. **Stream Errors**: Read/write failures, disconnects, oversize records
//! 3. **Configuration Errors**: Invalid addresses
//!
//! ## ⚠️ Important Note for Next Developer
//! - Bind errors are fatal for the server; everything else only ends one
//!   connection
//! - A clean close at a record boundary is NOT an error (`read_frame`
//!   returns `None`)
//!
//! ## Last Modified
//! v0.1.0 - TCP transport errors

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use lato_common::error::CommonError;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Listener Errors
    // ========================================
    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    /// Accepting a connection failed.
    #[error("Failed to accept connection: {source}")]
    AcceptFailed {
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    // ========================================
    // Stream Errors
    // ========================================
    /// Send operation failed.
    #[error("Failed to send: {reason}")]
    SendFailed {
        /// Why send failed
        reason: String,
    },

    /// Peer closed the stream in the middle of a record.
    #[error("Stream closed mid-record ({buffered} bytes buffered)")]
    UnexpectedEof {
        /// Bytes of the partial record
        buffered: usize,
    },

    /// Record length prefix exceeds the configured maximum.
    #[error("Record too large: max {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Maximum allowed record body
        max: usize,
        /// Announced record body length
        actual: usize,
    },

    // ========================================
    // Configuration Errors
    // ========================================
    /// Invalid socket address.
    #[error("Invalid address: {addr}")]
    InvalidAddress {
        /// The invalid address string
        addr: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================
    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the listener should keep accepting after this error.
    ///
    /// Per-connection accept failures (peer reset before accept, descriptor
    /// pressure) are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AcceptFailed { source } | Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Other
            ),
            _ => false,
        }
    }

    /// Returns `true` if the peer went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::UnexpectedEof { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
