// ============================================
// File: crates/lato-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! ## Creation Reason
//! Holds the shared state of the tunnel server, separated from transport
//! and connection handling.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`address_pool`]: Private address allocation
//! - [`session`]: Session registry and per-session state
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────────────────┐   ┌─────────────────────┐ │
//! │  │      SessionRegistry        │   │    AddressPool      │ │
//! │  │  - create / lookup / destroy│──►│  - allocate         │ │
//! │  │  - mint session keys        │   │  - release          │ │
//! │  │  - close signals            │   │                     │ │
//! │  └─────────────────────────────┘   └─────────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - These are the only shared mutable state in the server
//! - Both are injected through `Arc`; there are no globals
//! - Session teardown must go through the registry so the address is released
//!
//! ## Last Modified
//! v0.1.0 - Address pool and session registry

pub mod address_pool;
pub mod session;

pub use address_pool::AddressPool;
pub use session::{Session, SessionRegistry, SessionStats, StatsSnapshot};
