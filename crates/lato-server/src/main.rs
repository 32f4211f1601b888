// ============================================
// File: crates/lato-server/src/main.rs
// ============================================
//! # Lato Server Entry Point
//!
//! ## Creation Reason
//! Binary entry point: CLI parsing, logging setup, configuration loading and
//! running the tunnel server until a shutdown signal.
//!
//! ## Usage
//! ```bash
//! lato-server start --config /etc/lato/server.toml
//! lato-server validate --config /etc/lato/server.toml
//! lato-server defaults > /etc/lato/server.toml
//! ```
//!
//! ## Exit Codes
//! - `0`: Clean shutdown
//! - `1`: Startup failure (config, listener, fatal bootstrap) or a shutdown
//!   that outran the watchdog
//!
//! ## ⚠️ Important Note for Next Developer
//! - `RUST_LOG` overrides `logging.level`
//! - The watchdog runs on a plain thread so it fires even if the runtime hangs
//!
//! ## Last Modified
//! v0.1.0 - start / validate / defaults commands

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lato_server::config::{LogFormat, LoggingConfig};
use lato_server::server::shutdown_signal;
use lato_server::{ServerConfig, TunnelServer};

/// Extra time past the grace period before the watchdog exits the process.
const WATCHDOG_MARGIN: Duration = Duration::from_secs(5);

// ============================================
// CLI Definition
// ============================================

/// Lato encrypted tunnel server
#[derive(Parser, Debug)]
#[command(name = "lato-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/lato/server.toml")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/lato/server.toml")]
        config: PathBuf,
    },

    /// Print a configuration file with every default filled in
    Defaults,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config } => cmd_start(&config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
        Commands::Defaults => cmd_defaults(),
    };

    if let Err(e) = result {
        // Logging may not be initialized yet if config loading failed
        init_logging(&LoggingConfig::default());
        error!("{e:#}");
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server and runs it until SIGINT/SIGTERM.
async fn cmd_start(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    init_logging(&config.logging);

    let grace = config.shutdown.grace_period();
    let server = TunnelServer::new(config)?;
    server.start().await?;

    shutdown_signal().await?;
    spawn_watchdog(grace + WATCHDOG_MARGIN);

    let report = server.stop().await?;
    info!(
        graceful = report.graceful,
        forced = report.forced,
        "Shutdown complete"
    );
    Ok(())
}

/// Validates a configuration file and prints a summary.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    let (first, last) = config.pool.bounds()?;

    println!("Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:        {}", config.network.listen_addr);
    println!();
    println!("Pool:");
    println!("   Range:         {first} - {last}");
    println!("   Gateway:       {}", config.pool.gateway);
    println!();
    println!("Clients:");
    println!("   DNS:           {:?}", config.client.dns);
    println!("   Routes:        {}", config.client.routes.len());
    println!();
    println!("Limits:");
    println!("   Max sessions:  {}", config.limits.max_sessions);
    println!("   Max frame:     {}", config.limits.max_frame_size);
    println!("   Idle timeout:  {}s", config.limits.idle_timeout_secs);
    println!("   Grace period:  {}s", config.shutdown.grace_period_secs);
    println!();
    println!("Firewall:        {}", if config.firewall.enabled { "enabled" } else { "disabled" });
    println!(
        "Authorization:   {}",
        if config.authorization.has_api() { config.authorization.api_url.as_str() } else { "allow all" }
    );
    println!();

    Ok(())
}

/// Prints the default configuration as TOML.
fn cmd_defaults() -> anyhow::Result<()> {
    print!("{}", ServerConfig::default().to_toml()?);
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Loads the config file, or defaults if it does not exist.
async fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(ServerConfig::default())
    }
}

/// Initializes the tracing subscriber.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
    };
    result.ok();
}

/// Exits the process if shutdown has not finished within `limit`.
fn spawn_watchdog(limit: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(limit);
        error!(limit_secs = limit.as_secs(), "Shutdown watchdog expired, exiting");
        std::process::exit(1);
    });
}
