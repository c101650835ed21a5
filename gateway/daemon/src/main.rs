//! Split Gateway Daemon
//!
//! HTTP front end that splits time-ranged GET requests into concurrent
//! per-window backend requests and streams the merged JSON array back.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default config file ($XDG_CONFIG_HOME/split-gateway/gateway.toml)
//! gateway-daemon
//!
//! # Explicit config file and backend pool
//! gateway-daemon --config /etc/split-gateway/gateway.toml \
//!     --backend http://dbs1:8252/dbs --backend http://dbs2:8252/dbs
//!
//! # Verbose logging to a daily-rotated file
//! gateway-daemon -v --log-file /var/log/split-gateway/gateway.log
//! ```
//!
//! # Environment Variables
//!
//! - `GATEWAY_CONFIG`: Configuration file path
//! - `GATEWAY_PORT`: Listening port
//! - `GATEWAY_BACKENDS`: Comma-separated backend pool
//! - `GATEWAY_VERBOSE`: Verbosity level
//! - `GATEWAY_BUFFER_SIZE`: Maximum record line length in bytes
//! - `RUST_LOG`: Log filter (overrides verbosity)
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Stop accepting connections and exit

mod logging;
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use gateway_core::{load_config, load_config_from_path, ConfigOverrides, Gateway};

use server::GatewayServer;

/// Split Gateway - fan-out proxy for time-windowed queries
#[derive(Parser, Debug)]
#[command(name = "gateway-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "GATEWAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Backend base URL (repeatable)
    #[arg(short = 'b', long = "backend", value_name = "URL")]
    backends: Vec<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log file prefix, rotated daily
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(port) = self.port {
            overrides = overrides.with_port(port);
        }
        if !self.backends.is_empty() {
            overrides = overrides.with_backends(self.backends.clone());
        }
        if self.verbose > 0 {
            overrides = overrides.with_verbose(self.verbose);
        }
        if let Some(ref path) = self.log_file {
            overrides = overrides.with_log_file(path.clone());
        }
        overrides
    }
}

/// Resolve when SIGINT or SIGTERM arrives
async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);

    logging::init(config.verbose, config.log_file.as_deref())?;

    info!(
        source = %config.source(),
        file = ?config.config_file_path(),
        backends = config.backends.len(),
        apis = config.api_redirects.len(),
        "Starting split gateway"
    );

    let addr = config.listen_addr();
    let settings = config.into_settings().context("Invalid configuration")?;
    let gateway = Gateway::new(settings).context("Failed to initialise gateway")?;
    let server = GatewayServer::bind(&addr, gateway).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "Signal handling failed; shutting down");
        }
        shutdown.notify_one();
    });

    server.run().await?;
    info!("Split gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::GatewayConfigFile;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "gateway-daemon",
            "--port",
            "9000",
            "-b",
            "http://a:1/dbs",
            "--backend",
            "http://b:2/dbs",
            "-vv",
        ]);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.backends.len(), 2);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from(["gateway-daemon", "-p", "9001", "-b", "http://c:3/dbs"]);
        let mut config = GatewayConfigFile::new();
        args.overrides().apply(&mut config);

        assert_eq!(config.port, 9001);
        assert_eq!(config.backends, vec!["http://c:3/dbs".to_string()]);
        assert_eq!(config.verbose, 0);
    }

    #[test]
    fn test_no_args_leave_config_untouched() {
        let args = Args::parse_from(["gateway-daemon"]);
        let mut config = GatewayConfigFile::new();
        args.overrides().apply(&mut config);
        assert_eq!(config.source(), gateway_core::config::ConfigSource::Default);
    }
}
