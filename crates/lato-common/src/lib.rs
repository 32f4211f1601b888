// ============================================
// File: crates/lato-common/src/lib.rs
// ============================================
//! # Lato Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides foundational types and utilities shared across all Lato crates,
//! so that session identity and timing behave the same everywhere.
//!
//! ## Main Functionality
//! - [`types`]: Core type definitions (`SessionId`, `Ipv4Cidr`)
//! - [`time`]: Time utilities including atomic timestamps
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                lato-server                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     lato-core          lato-transport              │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              lato-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{Ipv4Cidr, SessionId};
