// ============================================
// File: crates/lato-core/src/lib.rs
// ============================================
//! # Lato Core - Session Crypto & Protocol Library
//!
//! ## Creation Reason
//! Provides the session crypto engine and the setup record format for the
//! Lato tunnel. Everything that touches key material lives here.
//!
//! ## Main Functionality
//!
//! ### Crypto Module ([`crypto`])
//! - `SessionKey`: random 256-bit per-session key
//! - `FrameCrypto` / `AesGcmFrameCrypto`: AES-256-GCM frames
//!
//! ### Protocol Module ([`protocol`])
//! - `ClientConfig`, `Route`, `SessionSetup`
//! - Binary codec for the setup record
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                lato-server                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     lato-core  ◄──     lato-transport              │
//! │   You are here                │                    │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              lato-common                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Confidentiality**: AES-256 in GCM mode
//! - **Integrity**: GHASH tag on every frame, checked before use
//! - **Key hygiene**: keys are random, session-scoped and zeroized on drop
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto implementations
//! - ALL keys MUST implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

pub use crypto::{AesGcmFrameCrypto, FrameCrypto, SessionKey};
pub use error::{CoreError, Result};
pub use protocol::{ClientConfig, Route, SessionSetup};
