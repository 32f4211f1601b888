// ============================================
// File: crates/lato-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines what the server tells a client when its session starts.
//!
//! ## Main Functionality
//! - [`messages`]: `ClientConfig`, `Route`, `SessionSetup`
//! - [`codec`]: Binary serialization/deserialization
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Client ◄─────── SessionSetup (config + key) ────── Server  │
//! │                                                             │
//! │  Client ══════ frames: IV ‖ ciphertext ‖ tag ══════► Server │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//! Both directions are carried in length-delimited records by the
//! transport layer.
//!
//! ## Wire Format Principles
//! - Big-endian (network) byte order
//! - Version byte first for forward compatibility
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;

pub use codec::{decode_session_setup, encode_session_setup, Codec, ProtocolCodec};
pub use messages::{setup_record_size, ClientConfig, Route, SessionSetup, SETUP_VERSION};
