// ============================================
// File: crates/lato-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Provides binary serialization and deserialization for the session
//! setup record.
//!
//! ## Main Functionality
//! - `Codec` trait: Generic encode/decode interface
//! - `ProtocolCodec`: Implementation for `SessionSetup`
//! - `encode_session_setup` / `decode_session_setup`
//!
//! ## Parsing Strategy
//! 1. Check minimum record length
//! 2. Check version
//! 3. Read counted sections, re-checking length before each
//! 4. Reject trailing bytes
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always validate buffer lengths before reading
//! - Encoded buffers contain key material; zeroize them after sending
//!
//! ## Last Modified
//! v0.1.0 - Session setup codec

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use lato_common::Ipv4Cidr;

use crate::crypto::{SessionKey, SESSION_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::messages::{
    ClientConfig, Route, SessionSetup, MAX_DNS_SERVERS, MAX_ROUTES, ROUTE_WIRE_SIZE,
    SESSION_SETUP_MIN_SIZE, SETUP_VERSION,
};

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    ///
    /// # Errors
    /// Returns an error if the message cannot be represented on the wire.
    fn encode(&self, msg: &T, buf: &mut BytesMut) -> Result<()>;

    /// Decodes a message from bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid message.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// ProtocolCodec
// ============================================

/// Codec implementation for protocol messages.
#[derive(Debug, Default, Clone)]
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Creates a new protocol codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ensure_remaining(buf: &Bytes, needed: usize, consumed: usize) -> Result<()> {
        if buf.remaining() < needed {
            return Err(CoreError::too_short(
                consumed + needed,
                consumed + buf.remaining(),
            ));
        }
        Ok(())
    }

    fn get_ipv4(buf: &mut Bytes) -> Ipv4Addr {
        Ipv4Addr::from(buf.get_u32())
    }
}

impl Codec<SessionSetup> for ProtocolCodec {
    fn encode(&self, msg: &SessionSetup, buf: &mut BytesMut) -> Result<()> {
        let config = &msg.config;
        if config.dns.len() > MAX_DNS_SERVERS {
            return Err(CoreError::too_large(MAX_DNS_SERVERS, config.dns.len()));
        }
        if config.routes.len() > MAX_ROUTES {
            return Err(CoreError::too_large(MAX_ROUTES, config.routes.len()));
        }

        buf.reserve(msg.encoded_len());
        buf.put_u8(msg.version);
        buf.put_u32(u32::from(config.address));

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(config.dns.len() as u8);
        for server in &config.dns {
            buf.put_u32(u32::from(*server));
        }

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(config.routes.len() as u8);
        for route in &config.routes {
            buf.put_u32(u32::from(route.destination.network()));
            buf.put_u8(route.destination.prefix_len());
            buf.put_u32(u32::from(route.gateway));
        }

        buf.put_slice(msg.key.as_bytes());
        Ok(())
    }

    fn decode(&self, buf: &mut Bytes) -> Result<SessionSetup> {
        let total = buf.len();
        if total < SESSION_SETUP_MIN_SIZE {
            return Err(CoreError::too_short(SESSION_SETUP_MIN_SIZE, total));
        }

        let version = buf.get_u8();
        if version != SETUP_VERSION {
            return Err(CoreError::UnsupportedVersion {
                got: version,
                expected: SETUP_VERSION,
            });
        }

        let address = Self::get_ipv4(buf);

        let dns_count = usize::from(buf.get_u8());
        Self::ensure_remaining(buf, 4 * dns_count, total - buf.remaining())?;
        let dns = (0..dns_count).map(|_| Self::get_ipv4(buf)).collect();

        Self::ensure_remaining(buf, 1, total - buf.remaining())?;
        let route_count = usize::from(buf.get_u8());
        Self::ensure_remaining(buf, ROUTE_WIRE_SIZE * route_count, total - buf.remaining())?;
        let mut routes = Vec::with_capacity(route_count);
        for _ in 0..route_count {
            let network = Self::get_ipv4(buf);
            let prefix_len = buf.get_u8();
            let gateway = Self::get_ipv4(buf);
            let destination = Ipv4Cidr::new(network, prefix_len)
                .map_err(|_| CoreError::malformed(format!("route prefix /{prefix_len}")))?;
            routes.push(Route::new(destination, gateway));
        }

        Self::ensure_remaining(buf, SESSION_KEY_SIZE, total - buf.remaining())?;
        let key = SessionKey::from_slice(&buf.split_to(SESSION_KEY_SIZE))?;

        if buf.has_remaining() {
            return Err(CoreError::malformed(format!(
                "{} trailing bytes after session setup",
                buf.remaining()
            )));
        }

        Ok(SessionSetup {
            version,
            config: ClientConfig::new(address, dns, routes),
            key,
        })
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Encodes a session setup record to bytes.
///
/// # Errors
/// Returns `MessageTooLarge` if the DNS or route list exceeds 255 entries.
pub fn encode_session_setup(msg: &SessionSetup) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(msg.encoded_len());
    ProtocolCodec.encode(msg, &mut buf)?;
    Ok(buf)
}

/// Decodes a session setup record from bytes.
///
/// # Errors
/// Returns a protocol error if the record is truncated, has trailing
/// bytes or carries an unknown version.
pub fn decode_session_setup(buf: &[u8]) -> Result<SessionSetup> {
    let mut bytes = Bytes::copy_from_slice(buf);
    ProtocolCodec.decode(&mut bytes)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_setup() -> SessionSetup {
        let config = ClientConfig::new(
            Ipv4Addr::new(10, 8, 0, 2),
            vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            vec![Route::new(
                "0.0.0.0/0".parse().unwrap(),
                Ipv4Addr::new(10, 8, 0, 1),
            )],
        );
        SessionSetup::new(config, SessionKey::from_bytes([0x5A; 32]))
    }

    #[test]
    fn test_session_setup_roundtrip() {
        let setup = sample_setup();
        let encoded = encode_session_setup(&setup).unwrap();
        assert_eq!(encoded.len(), setup.encoded_len());

        let decoded = decode_session_setup(&encoded).unwrap();
        assert_eq!(decoded.version, SETUP_VERSION);
        assert_eq!(decoded.config, setup.config);
        assert_eq!(decoded.key.as_bytes(), setup.key.as_bytes());
    }

    #[test]
    fn test_wire_layout() {
        let encoded = encode_session_setup(&sample_setup()).unwrap();
        assert_eq!(encoded[0], SETUP_VERSION);
        assert_eq!(&encoded[1..5], &[10, 8, 0, 2]);
        assert_eq!(encoded[5], 2);
        assert_eq!(&encoded[6..10], &[8, 8, 8, 8]);
        assert_eq!(encoded[14], 1);
        assert_eq!(&encoded[15..24], &[0, 0, 0, 0, 0, 10, 8, 0, 1]);
        assert_eq!(&encoded[24..], &[0x5A; 32]);
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = encode_session_setup(&sample_setup()).unwrap();
        for len in [0, 10, encoded.len() - 1] {
            let err = decode_session_setup(&encoded[..len]).unwrap_err();
            assert!(err.is_protocol_error(), "len {len}: {err}");
        }
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut encoded = encode_session_setup(&sample_setup()).unwrap();
        encoded[0] = 0x7F;
        assert!(matches!(
            decode_session_setup(&encoded),
            Err(CoreError::UnsupportedVersion { got: 0x7F, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = encode_session_setup(&sample_setup()).unwrap().to_vec();
        encoded.push(0);
        assert!(matches!(
            decode_session_setup(&encoded),
            Err(CoreError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_prefix() {
        let mut encoded = encode_session_setup(&sample_setup()).unwrap();
        encoded[19] = 40;
        assert!(matches!(
            decode_session_setup(&encoded),
            Err(CoreError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_too_many_dns() {
        let mut setup = sample_setup();
        setup.config.dns = vec![Ipv4Addr::LOCALHOST; MAX_DNS_SERVERS + 1];
        assert!(matches!(
            encode_session_setup(&setup),
            Err(CoreError::MessageTooLarge { .. })
        ));
    }
}
