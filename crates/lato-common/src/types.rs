// ============================================
// File: crates/lato-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the session identifier used as the registry key throughout
//! the tunnel, so that every component derives it the same way.
//!
//! ## Main Functionality
//! - `SessionId`: 16-byte identifier derived from the peer endpoint
//! - `Ipv4Cidr`: IPv4 network prefix used by routes, the pool and firewall rules
//! - Parsing, display and serde implementations
//!
//! ## Derivation
//! ```text
//! SessionId = SHA-256("lato-session-v1" || ip_octets || port_be)[0..16]
//! ```
//! The same peer endpoint always yields the same id. Two live connections
//! can never share an endpoint, so the id is unique among live sessions.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The id is an identifier, not a secret; it is safe to log
//! - Changing the derivation changes every id (only matters for logs)
//!
//! ## Last Modified
//! v0.1.0 - Endpoint-derived session ids

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Size of SessionId in bytes
pub const SESSION_ID_SIZE: usize = 16;

/// Domain separation prefix for id derivation.
const SESSION_ID_DOMAIN: &[u8] = b"lato-session-v1";

// ============================================
// SessionId Error Type
// ============================================

/// Error type for SessionId parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionIdError {
    /// Base64 decoding failed
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),
    /// Decoded bytes have wrong length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}

// ============================================
// SessionId
// ============================================

/// Identifier of a live session, derived from the peer endpoint.
///
/// # Example
/// ```
/// use lato_common::types::SessionId;
///
/// let peer = "203.0.113.7:50123".parse().unwrap();
/// let id = SessionId::from_endpoint(&peer);
///
/// assert_eq!(id, SessionId::from_endpoint(&peer));
/// assert_eq!(id, id.to_string().parse().unwrap());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Derives the session id for a peer endpoint.
    #[must_use]
    pub fn from_endpoint(peer: &SocketAddr) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SESSION_ID_DOMAIN);
        match peer.ip() {
            IpAddr::V4(ip) => hasher.update(ip.octets()),
            IpAddr::V6(ip) => hasher.update(ip.octets()),
        }
        hasher.update(peer.port().to_be_bytes());
        let digest = hasher.finalize();

        let mut id = [0u8; SESSION_ID_SIZE];
        id.copy_from_slice(&digest[..SESSION_ID_SIZE]);
        Self(id)
    }

    /// Creates a `SessionId` from raw bytes.
    ///
    /// Returns `None` if `bytes` is not exactly 16 bytes long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let id: [u8; SESSION_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(id))
    }

    /// Returns the raw bytes of the session ID.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionId({:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| SessionIdError::InvalidBase64(e.to_string()))?;

        Self::from_bytes(&bytes).ok_or(SessionIdError::InvalidLength {
            expected: SESSION_ID_SIZE,
            actual: bytes.len(),
        })
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================
// Ipv4Cidr
// ============================================

/// An IPv4 network prefix such as `10.8.0.0/24`.
///
/// Host bits of the address are cleared on construction, so
/// `10.8.0.7/24` and `10.8.0.0/24` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Creates a prefix from an address and a prefix length.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `prefix_len` exceeds 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> crate::Result<Self> {
        if prefix_len > 32 {
            return Err(CommonError::invalid_input(
                "prefix_len",
                format!("{prefix_len} exceeds 32"),
            ));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    const fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len as u32)
        }
    }

    /// Returns the network address.
    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Returns the prefix length in bits.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the broadcast address of the network.
    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !Self::mask(self.prefix_len))
    }

    /// Returns `true` if `ip` lies inside the network.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask(self.prefix_len) == u32::from(self.network)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CommonError::invalid_input("cidr", format!("missing '/' in '{s}'")))?;
        let addr: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| CommonError::invalid_input("cidr", format!("bad address in '{s}'")))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| CommonError::invalid_input("cidr", format!("bad prefix in '{s}'")))?;
        Self::new(addr, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_same_endpoint_same_id() {
        let a = SessionId::from_endpoint(&peer("10.0.0.5:40000"));
        let b = SessionId::from_endpoint(&peer("10.0.0.5:40000"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_port_changes_id() {
        let a = SessionId::from_endpoint(&peer("10.0.0.5:40000"));
        let b = SessionId::from_endpoint(&peer("10.0.0.5:40001"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_ipv6_endpoint() {
        let a = SessionId::from_endpoint(&peer("[::1]:40000"));
        let b = SessionId::from_endpoint(&peer("127.0.0.1:40000"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let id = SessionId::from_endpoint(&peer("192.0.2.1:1194"));
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let short = BASE64.encode([1u8, 2, 3]);
        assert_eq!(
            short.parse::<SessionId>(),
            Err(SessionIdError::InvalidLength { expected: 16, actual: 3 })
        );
        assert!(matches!(
            "***".parse::<SessionId>(),
            Err(SessionIdError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_debug_is_truncated() {
        let id = SessionId::from_bytes(&[0xab; 16]).unwrap();
        assert_eq!(format!("{id:?}"), "SessionId(abababab...)");
    }

    #[test]
    fn test_cidr_parse_and_mask() {
        let cidr: Ipv4Cidr = "10.8.0.7/24".parse().unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 8, 0, 0));
        assert_eq!(cidr.broadcast(), Ipv4Addr::new(10, 8, 0, 255));
        assert_eq!(cidr.to_string(), "10.8.0.0/24");
        assert!(cidr.contains(Ipv4Addr::new(10, 8, 0, 200)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 8, 1, 1)));
    }

    #[test]
    fn test_cidr_default_route() {
        let cidr: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(cidr.contains(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(cidr.broadcast(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_cidr_rejects_garbage() {
        assert!("10.8.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.8.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("ten/8".parse::<Ipv4Cidr>().is_err());
    }
}
