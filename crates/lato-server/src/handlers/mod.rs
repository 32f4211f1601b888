// ============================================
// File: crates/lato-server/src/handlers/mod.rs
// ============================================
//! # Connection Handlers
//!
//! ## Creation Reason
//! Per-connection logic: the state machine that owns a client connection and
//! the processor seam its decrypted payloads flow into.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`connection`]: Connection state machine, session setup, teardown
//! - [`packet`]: `PacketProcessor` trait and the logging default
//!
//! ## Data Flow
//! ```text
//! Client → TCP record → Decrypt (session key) → PacketProcessor
//!                          │
//!                          └─ auth failure → close, destroy session
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One handler task per connection; frames of a connection are sequential
//! - Update session activity on every authenticated frame
//!
//! ## Last Modified
//! v0.1.0 - Connection handler and packet processor

pub mod connection;
pub mod packet;

pub use connection::{
    CloseReason, ConnectionContext, ConnectionEvent, ConnectionHandler, ConnectionState,
};
pub use packet::{LoggingProcessor, PacketProcessor};
