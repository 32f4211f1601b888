// ============================================
// File: crates/lato-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Error Scopes
//! - Per-connection: `PoolExhausted`, `SessionExists`, `SessionLimitReached`,
//!   `Unauthorized`, wrapped `Core`/`Transport` errors. The connection is
//!   closed, the server keeps running.
//! - Startup: `ConfigLoad`, `ConfigInvalid`, `Listener`, and `Bootstrap`
//!   when `firewall.fail_on_error` is set.
//!
//! ## Last Modified
//! v0.1.0 - Tunnel server errors

use std::net::SocketAddr;

use thiserror::Error;

use lato_common::error::CommonError;
use lato_core::error::CoreError;
use lato_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    // ========================================
    // Startup Errors
    // ========================================
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the file
        path: String,
        /// Reader or parser message
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted name of the offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// The listener could not be bound.
    #[error("Listener failed on {addr}: {source}")]
    Listener {
        /// Configured listen address
        addr: SocketAddr,
        /// Underlying transport error
        #[source]
        source: TransportError,
    },

    /// A firewall/NAT command failed.
    #[error("Network bootstrap failed running '{command}': {reason}")]
    Bootstrap {
        /// Command line that was run
        command: String,
        /// Spawn error or exit status
        reason: String,
    },

    /// `start` was called on a running server.
    #[error("Server is already running")]
    AlreadyRunning,

    // ========================================
    // Admission Errors
    // ========================================
    /// Every pool address is assigned.
    #[error("Address pool exhausted")]
    PoolExhausted,

    /// A session for the same peer endpoint is live.
    #[error("Session already exists for client")]
    SessionExists,

    /// `limits.max_sessions` sessions are live.
    #[error("Session limit reached: max {limit} sessions")]
    SessionLimitReached {
        /// Configured limit
        limit: usize,
    },

    /// The authorizer denied the peer.
    #[error("Peer {peer} is not authorized for '{resource}'")]
    Unauthorized {
        /// Rejected peer
        peer: SocketAddr,
        /// Resource that was checked
        resource: String,
    },

    /// The authorization service could not answer.
    #[error("Authorization check failed: {reason}")]
    Authorization {
        /// Request, status or decode failure
        reason: String,
    },

    /// Client side: the server closed before sending the setup record.
    #[error("Server closed the connection without a session setup")]
    NoSessionSetup,

    // ========================================
    // Runtime Errors
    // ========================================
    /// The server stopped while the operation was in flight.
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Unexpected condition.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of what went wrong
        message: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================
    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Crypto or protocol error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Listener or framing error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// System I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Authorization` error.
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Creates a `Bootstrap` error.
    pub fn bootstrap(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that refuse a single connection at admission
    /// (`NoSessionSetup` is how a client observes one).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted
                | Self::SessionExists
                | Self::SessionLimitReached { .. }
                | Self::Unauthorized { .. }
                | Self::NoSessionSetup
        )
    }

    /// Returns `true` if the error means the peer failed frame authentication.
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Core(CoreError::Authentication))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/lato/server.toml", "file not found");
        assert!(err.to_string().contains("/etc/lato/server.toml"));

        assert_eq!(ServerError::PoolExhausted.to_string(), "Address pool exhausted");
    }

    #[test]
    fn test_error_classification() {
        assert!(ServerError::PoolExhausted.is_rejection());
        assert!(ServerError::SessionLimitReached { limit: 4 }.is_rejection());
        assert!(!ServerError::ShuttingDown.is_rejection());

        let auth: ServerError = CoreError::Authentication.into();
        assert!(auth.is_authentication_failure());
        assert!(!auth.is_rejection());

        let bootstrap = ServerError::bootstrap("iptables", "exit status 1");
        assert!(bootstrap.to_string().contains("iptables"));
    }
}
