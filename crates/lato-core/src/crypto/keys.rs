// ============================================
// File: crates/lato-core/src/crypto/keys.rs
// ============================================
//! # Session Keys
//!
//! ## Creation Reason
//! Holds the per-session symmetric key with the security properties a
//! long-lived server needs: zeroize on drop and no accidental logging.
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  SessionKey (Per-session)                                  │
//! │  ├─ Generated from the OS CSPRNG when the session is made  │
//! │  ├─ Sent once to the client in the session setup record    │
//! │  ├─ Used for AES-256-GCM on every frame of the session     │
//! │  └─ Zeroed when the session is destroyed                   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never derive a key from a previous session's key
//! - Private key bytes should NEVER be logged or serialized carelessly
//!
//! ## Last Modified
//! v0.1.0 - Random per-session keys

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::SESSION_KEY_SIZE;
use crate::error::{CoreError, Result};

/// Symmetric session key for frame encryption.
///
/// # Security
/// - Zeroed on drop
/// - `Debug` never prints key material
///
/// # Example
/// ```
/// use lato_core::crypto::SessionKey;
///
/// let a = SessionKey::generate().unwrap();
/// let b = SessionKey::generate().unwrap();
/// assert_ne!(a.as_bytes(), b.as_bytes());
/// assert_eq!(format!("{a:?}"), "SessionKey([REDACTED])");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Generates a fresh key from the operating system CSPRNG.
    ///
    /// # Errors
    /// Returns `KeyGeneration` if the OS random source is unavailable.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CoreError::key_generation(format!("session key: {e}")))?;
        Ok(Self(bytes))
    }

    /// Creates a session key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a session key from a slice.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SESSION_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::malformed(format!(
                "session key must be {SESSION_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Returns the raw key bytes.
    ///
    /// # Security Warning
    /// Do not log or store the returned bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}
