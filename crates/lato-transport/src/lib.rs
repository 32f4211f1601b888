// ============================================
// File: crates/lato-transport/src/lib.rs
// ============================================
//! # Lato Transport - Network I/O Layer
//!
//! ## Creation Reason
//! Provides the network transport for the Lato tunnel: the TCP listener
//! clients connect to and the record framing used on every connection.
//!
//! ## Main Functionality
//! - [`traits`]: `Listener` abstraction and connection metadata
//! - [`tcp`]: TCP listener implementation
//! - [`framing`]: Length-delimited records over a byte stream
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                lato-server                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     lato-core          lato-transport              │
//! │                        You are here ◄──            │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              lato-common                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate knows nothing about encryption; record bodies are opaque
//! - Always use traits for testability
//!
//! ## Last Modified
//! v0.1.0 - TCP transport

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod framing;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use framing::{FramedStream, DEFAULT_MAX_FRAME_SIZE};
pub use tcp::TcpTransport;
pub use traits::{ConnectionInfo, Listener};
