// ============================================
// File: crates/lato-server/src/bootstrap/firewall.rs
// ============================================
//! # iptables Bootstrap
//!
//! ## Rules
//! ```text
//! iptables -t nat -A POSTROUTING -s <subnet> -o <egress> -j MASQUERADE
//! iptables -A FORWARD -i <tunnel> -o <egress> -j ACCEPT
//! iptables -A FORWARD -i <egress> -o <tunnel> -j ACCEPT
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Requires root or CAP_NET_ADMIN
//! - Rules run in order and stop at the first failure
//!
//! ## Last Modified
//! v0.1.0 - Initial rules

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::NetworkBootstrap;
use crate::config::FirewallConfig;
use crate::error::{Result, ServerError};

const IPTABLES: &str = "iptables";

/// Installs NAT and forwarding rules for the tunnel subnet.
#[derive(Debug, Clone)]
pub struct IptablesBootstrap {
    program: String,
    rules: Vec<Vec<String>>,
}

impl IptablesBootstrap {
    /// Creates the bootstrap for `config`.
    #[must_use]
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            program: IPTABLES.to_string(),
            rules: Self::build_rules(config),
        }
    }

    /// Runs `program` instead of `iptables`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_rules(config: &FirewallConfig) -> Vec<Vec<String>> {
        let subnet = config.subnet.to_string();
        let egress = config.egress_interface.as_str();
        let tunnel = config.tunnel_interface.as_str();

        let rule = |args: &[&str]| args.iter().map(|a| (*a).to_string()).collect::<Vec<_>>();

        vec![
            rule(&[
                "-t", "nat", "-A", "POSTROUTING", "-s", &subnet, "-o", egress, "-j", "MASQUERADE",
            ]),
            rule(&["-A", "FORWARD", "-i", tunnel, "-o", egress, "-j", "ACCEPT"]),
            rule(&["-A", "FORWARD", "-i", egress, "-o", tunnel, "-j", "ACCEPT"]),
        ]
    }

    /// Returns the argument lists that `install` runs.
    #[must_use]
    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command, "Installing firewall rule");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| ServerError::bootstrap(&command, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServerError::bootstrap(
                command,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl NetworkBootstrap for IptablesBootstrap {
    async fn install(&self) -> Result<()> {
        for rule in &self.rules {
            self.run(rule).await?;
        }
        info!(rules = self.rules.len(), "Firewall rules installed");
        Ok(())
    }
}
