// ============================================
// File: crates/lato-server/src/bootstrap/mod.rs
// ============================================
//! # Network Bootstrap
//!
//! ## Creation Reason
//! Forwarding and NAT for the tunnel subnet are installed once when the
//! server starts. The step is isolated behind a trait so the server can be
//! started without root in tests.
//!
//! ## Main Functionality
//! - `NetworkBootstrap`: one-shot `install()`
//! - `IptablesBootstrap`: MASQUERADE + FORWARD rules via `iptables`
//! - `NoopBootstrap`: used when `firewall.enabled = false`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Rules are appended, not checked; restarting the server adds duplicates
//! - Failure is logged and ignored unless `firewall.fail_on_error` is set
//!   (the server decides, not this module)
//!
//! ## Last Modified
//! v0.1.0 - iptables bootstrap

pub mod firewall;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FirewallConfig;
use crate::error::Result;

pub use firewall::IptablesBootstrap;

/// One-shot host network setup run at server start.
#[async_trait]
pub trait NetworkBootstrap: Send + Sync {
    /// Installs the rules.
    ///
    /// # Errors
    /// Returns `Bootstrap` naming the command that failed.
    async fn install(&self) -> Result<()>;
}

/// Installs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBootstrap;

#[async_trait]
impl NetworkBootstrap for NoopBootstrap {
    async fn install(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds the bootstrap described by `config`.
#[must_use]
pub fn from_config(config: &FirewallConfig) -> Arc<dyn NetworkBootstrap> {
    if config.enabled {
        Arc::new(IptablesBootstrap::new(config))
    } else {
        Arc::new(NoopBootstrap)
    }
}
