// ============================================
// File: crates/lato-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the session crypto engine: key minting and AEAD framing of
//! tunnel payloads, using audited RustCrypto implementations.
//!
//! ## Main Functionality
//! - [`keys`]: `SessionKey` generation and lifecycle
//! - [`transport`]: AES-256-GCM frame encryption (`FrameCrypto`)
//!
//! ## Frame Design
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │   SessionKey + random IV ──► AES-256-GCM ──► IV ‖ ct ‖ tag    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own crypto
//! - The IV is 16 bytes, not the usual 12; peers depend on this
//! - Session keys are fresh per session and never persisted
//!
//! ## Last Modified
//! v0.1.0 - AES-256-GCM session frames

pub mod keys;
pub mod transport;

pub use keys::SessionKey;
pub use transport::{decrypt_frame, encrypt_frame, AesGcmFrameCrypto, FrameCrypto};

// ============================================
// Constants
// ============================================

/// Size of the AES-256 session key in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of the per-frame random IV in bytes.
pub const FRAME_IV_SIZE: usize = 16;

/// Size of the GCM authentication tag in bytes.
pub const FRAME_TAG_SIZE: usize = 16;

/// Bytes added to every plaintext by framing (IV + tag).
pub const FRAME_OVERHEAD: usize = FRAME_IV_SIZE + FRAME_TAG_SIZE;
