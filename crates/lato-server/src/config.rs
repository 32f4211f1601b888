// ============================================
// File: crates/lato-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the tunnel server, loaded once
//! from a TOML file at startup.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Defaults matching the classic deployment (port 1194, 10.8.0.0/24)
//!
//! ## Configuration Sections
//! - `network`: TCP listen address
//! - `pool`: Client address range and gateway
//! - `client`: DNS servers and routes pushed to clients
//! - `limits`: Session count, record size, idle timeout
//! - `shutdown`: Grace period before connections are force-closed
//! - `firewall`: NAT/forwarding rules installed at startup
//! - `authorization`: Management API used for admission checks
//! - `logging`: Log level and format
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:1194"
//!
//! [pool]
//! address_range = "10.8.0.2-10.8.0.254"
//! gateway = "10.8.0.1"
//!
//! [client]
//! dns = ["8.8.8.8", "8.8.4.4"]
//! routes = [{ destination = "0.0.0.0/0", gateway = "10.8.0.1" }]
//!
//! [limits]
//! max_sessions = 253
//! idle_timeout_secs = 0
//!
//! [shutdown]
//! grace_period_secs = 10
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require server restart
//! - Validate config before server startup
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use lato_common::Ipv4Cidr;
use lato_core::crypto::FRAME_OVERHEAD;
use lato_core::protocol::messages::{setup_record_size, MAX_DNS_SERVERS, MAX_ROUTES};
use lato_core::Route;

use crate::error::{Result, ServerError};

/// Upper bound accepted for `limits.max_frame_size`.
const MAX_FRAME_SIZE_LIMIT: usize = 16 * 1024 * 1024;

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Address pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Settings pushed to every client.
    #[serde(default)]
    pub client: ClientSettings,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Firewall/NAT bootstrap.
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Authorization collaborator.
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigLoad` if the file cannot be read or parsed, and
    /// `ConfigInvalid` if validation fails.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Same as [`ServerConfig::load`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.pool.validate()?;
        self.client.validate()?;
        self.limits.validate()?;
        self.shutdown.validate()?;
        self.firewall.validate()?;
        self.authorization.validate()?;
        self.logging.validate()?;

        // The setup record goes out through the same framing as client frames
        let setup_size = setup_record_size(self.client.dns.len(), self.client.routes.len());
        if self.limits.max_frame_size < setup_size {
            return Err(ServerError::config_invalid(
                "limits.max_frame_size",
                format!(
                    "{} is smaller than the {setup_size}-byte session setup record",
                    self.limits.max_frame_size
                ),
            ));
        }
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    ///
    /// # Errors
    /// Returns `Internal` if a value has no TOML representation.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ServerError::internal(format!("config serialization: {e}")))
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1194))
}

impl NetworkConfig {
    #[allow(clippy::unnecessary_wraps)]
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

// ============================================
// PoolConfig
// ============================================

/// Address pool configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Inclusive range `"start-end"` or CIDR `"network/prefix"`.
    #[serde(default = "default_address_range")]
    pub address_range: String,

    /// Server-side tunnel address, never handed to a client.
    #[serde(default = "default_gateway")]
    pub gateway: Ipv4Addr,
}

fn default_address_range() -> String {
    "10.8.0.2-10.8.0.254".to_string()
}

fn default_gateway() -> Ipv4Addr {
    Ipv4Addr::new(10, 8, 0, 1)
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        self.bounds().map(|_| ())
    }

    /// Resolves `address_range` into inclusive `(first, last)` bounds.
    ///
    /// A CIDR range excludes the network and broadcast addresses
    /// (except for /31 and /32, which have none).
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the range does not parse or is reversed.
    pub fn bounds(&self) -> Result<(Ipv4Addr, Ipv4Addr)> {
        let range = self.address_range.trim();
        let invalid = |reason: String| ServerError::config_invalid("pool.address_range", reason);

        let (first, last) = if let Some((start, end)) = range.split_once('-') {
            let start: Ipv4Addr = start
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad start address in '{range}'")))?;
            let end: Ipv4Addr = end
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad end address in '{range}'")))?;
            (start, end)
        } else if range.contains('/') {
            let cidr: Ipv4Cidr = range.parse().map_err(|e| invalid(format!("{e}")))?;
            let network = u32::from(cidr.network());
            let broadcast = u32::from(cidr.broadcast());
            if cidr.prefix_len() >= 31 {
                (Ipv4Addr::from(network), Ipv4Addr::from(broadcast))
            } else {
                (Ipv4Addr::from(network + 1), Ipv4Addr::from(broadcast - 1))
            }
        } else {
            return Err(invalid(format!(
                "'{range}' is neither 'start-end' nor CIDR"
            )));
        };

        if first > last {
            return Err(invalid(format!("start {first} is after end {last}")));
        }
        Ok((first, last))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address_range: default_address_range(),
            gateway: default_gateway(),
        }
    }
}

// ============================================
// ClientSettings
// ============================================

/// Settings every client receives in its session setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// DNS servers.
    #[serde(default = "default_dns")]
    pub dns: Vec<Ipv4Addr>,

    /// Routes to install through the tunnel.
    #[serde(default = "default_routes")]
    pub routes: Vec<Route>,
}

fn default_dns() -> Vec<Ipv4Addr> {
    vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]
}

fn default_routes() -> Vec<Route> {
    let everything = Ipv4Cidr::new(Ipv4Addr::UNSPECIFIED, 0)
        .unwrap_or_else(|_| unreachable!("prefix 0 is always valid"));
    vec![Route::new(everything, default_gateway())]
}

impl ClientSettings {
    fn validate(&self) -> Result<()> {
        if self.dns.len() > MAX_DNS_SERVERS {
            return Err(ServerError::config_invalid(
                "client.dns",
                format!("at most {MAX_DNS_SERVERS} servers"),
            ));
        }
        if self.routes.len() > MAX_ROUTES {
            return Err(ServerError::config_invalid(
                "client.routes",
                format!("at most {MAX_ROUTES} routes"),
            ));
        }
        Ok(())
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            dns: default_dns(),
            routes: default_routes(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum record body size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Close a session after this many seconds without a frame (0 disables).
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

fn default_max_sessions() -> usize {
    253
}

fn default_max_frame_size() -> usize {
    65535
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_sessions",
                "must be greater than 0",
            ));
        }

        if self.max_frame_size <= FRAME_OVERHEAD {
            return Err(ServerError::config_invalid(
                "limits.max_frame_size",
                format!("must be greater than {FRAME_OVERHEAD}"),
            ));
        }

        if self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            return Err(ServerError::config_invalid(
                "limits.max_frame_size",
                format!("cannot exceed {MAX_FRAME_SIZE_LIMIT}"),
            ));
        }

        Ok(())
    }

    /// Returns the idle timeout, or `None` when disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_frame_size: default_max_frame_size(),
            idle_timeout_secs: 0,
        }
    }
}

// ============================================
// ShutdownConfig
// ============================================

/// Shutdown configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds to wait for connections to close before aborting them.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_grace_period_secs() -> u64 {
    10
}

impl ShutdownConfig {
    fn validate(&self) -> Result<()> {
        if self.grace_period_secs > 3600 {
            return Err(ServerError::config_invalid(
                "shutdown.grace_period_secs",
                "cannot exceed 3600",
            ));
        }
        Ok(())
    }

    /// Returns the grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

// ============================================
// FirewallConfig
// ============================================

/// Firewall/NAT bootstrap configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Install rules at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tunnel subnet to masquerade.
    #[serde(default = "default_subnet")]
    pub subnet: Ipv4Cidr,

    /// Interface facing the internet.
    #[serde(default = "default_egress_interface")]
    pub egress_interface: String,

    /// Tunnel-side interface.
    #[serde(default = "default_tunnel_interface")]
    pub tunnel_interface: String,

    /// Abort startup if a rule cannot be installed.
    #[serde(default)]
    pub fail_on_error: bool,
}

fn default_true() -> bool {
    true
}

fn default_subnet() -> Ipv4Cidr {
    Ipv4Cidr::new(Ipv4Addr::new(10, 8, 0, 0), 24)
        .unwrap_or_else(|_| unreachable!("prefix 24 is always valid"))
}

fn default_egress_interface() -> String {
    "eth0".to_string()
}

fn default_tunnel_interface() -> String {
    "tun0".to_string()
}

fn validate_interface(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ServerError::config_invalid(field, "cannot be empty"));
    }
    if name.len() > 15 {
        return Err(ServerError::config_invalid(
            field,
            "cannot exceed 15 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ServerError::config_invalid(
            field,
            "may only contain letters, digits, '-', '_' and '.'",
        ));
    }
    Ok(())
}

impl FirewallConfig {
    fn validate(&self) -> Result<()> {
        validate_interface("firewall.egress_interface", &self.egress_interface)?;
        validate_interface("firewall.tunnel_interface", &self.tunnel_interface)?;
        Ok(())
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subnet: default_subnet(),
            egress_interface: default_egress_interface(),
            tunnel_interface: default_tunnel_interface(),
            fail_on_error: false,
        }
    }
}

// ============================================
// AuthorizationConfig
// ============================================

/// Authorization collaborator configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Management API base URL (empty allows everything).
    #[serde(default)]
    pub api_url: String,

    /// Resource checked before a tunnel session is created (empty disables).
    #[serde(default)]
    pub tunnel_resource: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl AuthorizationConfig {
    fn validate(&self) -> Result<()> {
        if !self.api_url.is_empty()
            && !self.api_url.starts_with("http://")
            && !self.api_url.starts_with("https://")
        {
            return Err(ServerError::config_invalid(
                "authorization.api_url",
                "must start with http:// or https://",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ServerError::config_invalid(
                "authorization.request_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns `true` if a management API is configured.
    #[must_use]
    pub fn has_api(&self) -> bool {
        !self.api_url.is_empty()
    }

    /// Returns the resource to check at admission, if admission checks are on.
    #[must_use]
    pub fn admission_resource(&self) -> Option<&str> {
        (!self.tunnel_resource.is_empty()).then_some(self.tunnel_resource.as_str())
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            tunnel_resource: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ServerError::config_invalid(
                "logging.level",
                format!("unknown level '{other}'"),
            )),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.listen_addr.port(), 1194);
        assert_eq!(
            config.pool.bounds().unwrap(),
            (Ipv4Addr::new(10, 8, 0, 2), Ipv4Addr::new(10, 8, 0, 254))
        );
        assert_eq!(config.client.dns.len(), 2);
        assert_eq!(config.client.routes[0].gateway, Ipv4Addr::new(10, 8, 0, 1));
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(10));
        assert!(config.limits.idle_timeout().is_none());
        assert!(!config.authorization.has_api());
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "0.0.0.0:1194"

            [pool]
            address_range = "10.8.0.2-10.8.0.254"
            gateway = "10.8.0.1"

            [client]
            dns = ["1.1.1.1"]
            routes = [{ destination = "0.0.0.0/0", gateway = "10.8.0.1" }]

            [limits]
            max_sessions = 100
            max_frame_size = 4096
            idle_timeout_secs = 30

            [shutdown]
            grace_period_secs = 5

            [firewall]
            enabled = false
            subnet = "10.8.0.0/24"
            egress_interface = "ens3"

            [authorization]
            api_url = "https://manage.example.com/api"
            tunnel_resource = "tunnel"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.client.dns, vec![Ipv4Addr::new(1, 1, 1, 1)]);
        assert_eq!(config.limits.idle_timeout(), Some(Duration::from_secs(30)));
        assert!(!config.firewall.enabled);
        assert_eq!(config.firewall.egress_interface, "ens3");
        assert_eq!(config.firewall.tunnel_interface, "tun0");
        assert_eq!(config.authorization.admission_resource(), Some("tunnel"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_cidr_pool_range() {
        let pool = PoolConfig {
            address_range: "192.168.50.0/29".into(),
            gateway: Ipv4Addr::new(192, 168, 50, 1),
        };
        assert_eq!(
            pool.bounds().unwrap(),
            (Ipv4Addr::new(192, 168, 50, 1), Ipv4Addr::new(192, 168, 50, 6))
        );
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ServerConfig::from_str("[limits]\nmax_sessions = 0").is_err());
        assert!(ServerConfig::from_str("[pool]\naddress_range = \"10.8.0.9-10.8.0.2\"").is_err());
        assert!(ServerConfig::from_str("[pool]\naddress_range = \"nonsense\"").is_err());
        assert!(ServerConfig::from_str("[firewall]\negress_interface = \"eth0; reboot\"").is_err());
        assert!(ServerConfig::from_str("[authorization]\napi_url = \"ftp://x\"").is_err());
        assert!(ServerConfig::from_str("[logging]\nlevel = \"loud\"").is_err());

        let err = ServerConfig::from_str("[limits]\nmax_frame_size = 8").unwrap_err();
        assert!(matches!(err, ServerError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_max_frame_size_must_fit_setup_record() {
        // Defaults: 2 DNS servers and 1 route
        let setup_size = setup_record_size(2, 1);
        let mut config = ServerConfig::default();

        config.limits.max_frame_size = setup_size - 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ServerError::ConfigInvalid { ref field, .. } if field == "limits.max_frame_size"
        ));

        config.limits.max_frame_size = setup_size;
        assert!(config.validate().is_ok());

        // More client settings raise the floor
        config.client.dns.push(Ipv4Addr::new(1, 1, 1, 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ServerConfig::default();
        let reparsed = ServerConfig::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed.pool.address_range, config.pool.address_range);
        assert_eq!(reparsed.client.routes, config.client.routes);
    }
}
