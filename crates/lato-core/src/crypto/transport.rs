// ============================================
// File: crates/lato-core/src/crypto/transport.rs
// ============================================
//! # Frame Encryption
//!
//! ## Creation Reason
//! Provides authenticated encryption for tunnel payloads using AES-256-GCM
//! with a random 16-byte IV per frame.
//!
//! ## Main Functionality
//! - `FrameCrypto`: Trait for frame encryption/decryption
//! - `AesGcmFrameCrypto`: Production implementation
//! - `encrypt_frame` / `decrypt_frame`: Convenience wrappers
//!
//! ## Frame Format
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ IV (16 bytes)                  │ ← random per frame │
//! ├────────────────────────────────────────────────────┤
//! │ Ciphertext (variable)          │ ← AES-256-CTR      │
//! ├────────────────────────────────────────────────────┤
//! │ Tag (16 bytes)                 │ ← GHASH tag        │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//! - **AEAD**: Any modified byte fails the tag check
//! - **Fail closed**: Every decryption failure maps to `Authentication`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never reuse a (key, IV) pair; IVs come from the OS CSPRNG
//! - A 16-byte GCM nonce is hashed into J0 (NIST SP 800-38D), which is
//!   what existing clients of this protocol expect
//!
//! ## Last Modified
//! v0.1.0 - AES-256-GCM frames

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use super::{SessionKey, FRAME_IV_SIZE, FRAME_OVERHEAD};
use crate::error::{CoreError, Result};

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

// ============================================
// FrameCrypto Trait
// ============================================

/// Trait for session frame encryption operations.
///
/// # Purpose
/// Abstracts the cipher so handlers can be tested with other
/// implementations and the suite can change without touching them.
pub trait FrameCrypto: Send + Sync {
    /// Encrypts a plaintext payload into a complete frame.
    ///
    /// # Returns
    /// `IV || ciphertext || tag`, exactly `plaintext.len() + FRAME_OVERHEAD` bytes.
    ///
    /// # Errors
    /// - `Encryption`: If the IV cannot be generated or sealing fails
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts and authenticates a frame.
    ///
    /// # Errors
    /// - `Authentication`: On any failure (short frame, bad tag, wrong key)
    fn decrypt(&self, key: &SessionKey, frame: &[u8]) -> Result<Vec<u8>>;
}

// ============================================
// AesGcmFrameCrypto
// ============================================

/// Default implementation using AES-256-GCM with 16-byte IVs.
#[derive(Debug, Default, Clone)]
pub struct AesGcmFrameCrypto;

impl AesGcmFrameCrypto {
    /// Creates a new instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Seals `plaintext` with an explicit IV.
    fn seal(key: &SessionKey, iv: &[u8; FRAME_IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
            .map_err(|_| CoreError::encryption("invalid key length"))?;

        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(iv), plaintext)
            .map_err(|_| CoreError::encryption("AES-256-GCM encryption failed"))?;

        let mut frame = Vec::with_capacity(FRAME_IV_SIZE + sealed.len());
        frame.extend_from_slice(iv);
        frame.extend_from_slice(&sealed);
        Ok(frame)
    }
}

impl FrameCrypto for AesGcmFrameCrypto {
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; FRAME_IV_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CoreError::encryption(format!("IV generation: {e}")))?;
        Self::seal(key, &iv, plaintext)
    }

    fn decrypt(&self, key: &SessionKey, frame: &[u8]) -> Result<Vec<u8>> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(CoreError::Authentication);
        }

        let (iv, sealed) = frame.split_at(FRAME_IV_SIZE);
        let cipher =
            Aes256Gcm16::new_from_slice(key.as_bytes()).map_err(|_| CoreError::Authentication)?;

        cipher
            .decrypt(Nonce::<U16>::from_slice(iv), sealed)
            .map_err(|_| CoreError::Authentication)
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Encrypts a payload using the default frame crypto.
///
/// # Errors
/// See [`FrameCrypto::encrypt`].
pub fn encrypt_frame(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    AesGcmFrameCrypto::new().encrypt(key, plaintext)
}

/// Decrypts a frame using the default frame crypto.
///
/// # Errors
/// See [`FrameCrypto::decrypt`].
pub fn decrypt_frame(key: &SessionKey, frame: &[u8]) -> Result<Vec<u8>> {
    AesGcmFrameCrypto::new().decrypt(key, frame)
}

// ============================================
// Tests
// ============================================
