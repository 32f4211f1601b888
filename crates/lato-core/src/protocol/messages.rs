// ============================================
// File: crates/lato-core/src/protocol/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines the one-time configuration a client receives when its session
//! is created, and the setup record that carries it on the wire.
//!
//! ## Main Functionality
//! - `Route`: Destination prefix plus gateway
//! - `ClientConfig`: Assigned address, DNS servers and routes
//! - `SessionSetup`: `ClientConfig` plus the session key
//!
//! ## Wire Format (Big Endian)
//! | Field | Size (bytes) |
//! |-------|--------------|
//! | version | 1 |
//! | address | 4 |
//! | dns_count | 1 |
//! | dns | 4 × dns_count |
//! | route_count | 1 |
//! | routes | 9 × route_count (destination 4, prefix 1, gateway 4) |
//! | session_key | 32 |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field order is critical - DO NOT reorder without a version bump
//! - `ClientConfig` is computed once per session and never mutated
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use lato_common::Ipv4Cidr;

use crate::crypto::{SessionKey, SESSION_KEY_SIZE};

// ============================================
// Constants
// ============================================

/// Current session setup record version.
pub const SETUP_VERSION: u8 = 0x01;

/// Maximum number of DNS servers in one record.
pub const MAX_DNS_SERVERS: usize = u8::MAX as usize;

/// Maximum number of routes in one record.
pub const MAX_ROUTES: usize = u8::MAX as usize;

/// Encoded size of one route.
pub const ROUTE_WIRE_SIZE: usize = 4 + 1 + 4;

/// Size of a setup record with no DNS servers and no routes.
pub const SESSION_SETUP_MIN_SIZE: usize = 1 + 4 + 1 + 1 + SESSION_KEY_SIZE;

/// Encoded size of a setup record carrying `dns_count` servers and
/// `route_count` routes.
#[must_use]
pub const fn setup_record_size(dns_count: usize, route_count: usize) -> usize {
    SESSION_SETUP_MIN_SIZE + 4 * dns_count + ROUTE_WIRE_SIZE * route_count
}

// ============================================
// Route
// ============================================

/// A route the client should install through the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix.
    pub destination: Ipv4Cidr,
    /// Next hop on the tunnel network.
    pub gateway: Ipv4Addr,
}

impl Route {
    /// Creates a new route.
    #[must_use]
    pub const fn new(destination: Ipv4Cidr, gateway: Ipv4Addr) -> Self {
        Self {
            destination,
            gateway,
        }
    }
}

// ============================================
// ClientConfig
// ============================================

/// Configuration pushed to a client once, right after its session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Private address assigned to the client.
    pub address: Ipv4Addr,
    /// DNS servers the client should use.
    pub dns: Vec<Ipv4Addr>,
    /// Routes the client should send through the tunnel.
    pub routes: Vec<Route>,
}

impl ClientConfig {
    /// Creates a client configuration.
    #[must_use]
    pub fn new(address: Ipv4Addr, dns: Vec<Ipv4Addr>, routes: Vec<Route>) -> Self {
        Self {
            address,
            dns,
            routes,
        }
    }
}

// ============================================
// SessionSetup
// ============================================

/// First record on every connection: client configuration and session key.
///
/// # Security
/// The record carries the session key in the clear. Its confidentiality
/// depends on the channel the connection runs over.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Record format version.
    pub version: u8,
    /// Client configuration.
    pub config: ClientConfig,
    /// Session key for all subsequent frames.
    pub key: SessionKey,
}

impl SessionSetup {
    /// Creates a setup record at the current version.
    #[must_use]
    pub const fn new(config: ClientConfig, key: SessionKey) -> Self {
        Self {
            version: SETUP_VERSION,
            config,
            key,
        }
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        setup_record_size(self.config.dns.len(), self.config.routes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_from_toml_shape() {
        let route: Route =
            serde_json::from_str(r#"{"destination":"0.0.0.0/0","gateway":"10.8.0.1"}"#).unwrap();
        assert_eq!(route.destination.prefix_len(), 0);
        assert_eq!(route.gateway, Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn test_encoded_len() {
        let config = ClientConfig::new(
            Ipv4Addr::new(10, 8, 0, 2),
            vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            vec![Route::new("0.0.0.0/0".parse().unwrap(), Ipv4Addr::new(10, 8, 0, 1))],
        );
        let setup = SessionSetup::new(config, SessionKey::from_bytes([0; 32]));
        assert_eq!(setup.encoded_len(), SESSION_SETUP_MIN_SIZE + 8 + 9);
        assert_eq!(setup_record_size(2, 1), 56);
    }
}
