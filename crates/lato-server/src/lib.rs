// ============================================
// File: crates/lato-server/src/lib.rs
// ============================================
//! # Lato Tunnel Server Library
//!
//! ## Creation Reason
//! Provides the tunnel server: accepts client connections, assigns each a
//! private address and a session key, and relays authenticated payloads to
//! a packet processor.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Lifecycle orchestration (`TunnelServer`)
//! - [`services`]: Shared state
//!   - [`services::address_pool`]: Private address allocation
//!   - [`services::session`]: Session registry
//! - [`handlers`]: Connection state machine and packet processor seam
//! - [`authz`]: Authorization collaborator
//! - [`bootstrap`]: Firewall/NAT installation at startup
//! - [`client`]: Client end of the protocol
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Lato Server                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐  │
//! │  │   Config    │────►│TunnelServer │────►│ Connection      │  │
//! │  │             │     │             │     │ Handlers (1/conn│  │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘  │
//! │                             │                     │           │
//! │         ┌───────────────────┼─────────────────────┤           │
//! │         ▼                   ▼                     ▼           │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐ │
//! │  │  Bootstrap  │     │  Session    │────►│  Address Pool   │ │
//! │  │  (iptables) │     │  Registry   │     │                 │ │
//! │  └─────────────┘     └─────────────┘     └─────────────────┘ │
//! │                                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │                     Transport Layer                           │
//! │  ┌─────────────────────┐     ┌─────────────────────────────┐ │
//! │  │    TCP Listener     │     │   Length-Delimited Records  │ │
//! │  └─────────────────────┘     └─────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! Client → TCP → Record → Decrypt → PacketProcessor
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Firewall bootstrap needs root or CAP_NET_ADMIN; it is skipped on failure
//!   unless configured otherwise
//! - Configuration changes require restart (no hot-reload)
//! - Shutdown waits for the grace period, then aborts connections
//!
//! ## Last Modified
//! v0.1.0 - Initial tunnel server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod authz;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod services;

// Re-export primary types
pub use client::TunnelClient;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use handlers::{LoggingProcessor, PacketProcessor};
pub use server::{ShutdownReport, TunnelServer};
pub use services::{AddressPool, Session, SessionRegistry};
