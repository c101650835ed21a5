//! Logging setup for the daemon
//!
//! Console output always; a daily-rotated log file when `log_file` is set.
//! `RUST_LOG` takes precedence over the configured verbosity.

use std::path::{Path, PathBuf};

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter directives for a verbosity level
fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "gateway_daemon=info,gateway_core=info",
        1 => "gateway_daemon=debug,gateway_core=debug",
        _ => "gateway_daemon=trace,gateway_core=trace,reqwest=debug,hyper=debug",
    }
}

/// Split a log file prefix into the directory and file name the appender expects
fn appender_target(log_file: &Path) -> (PathBuf, String) {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let name = log_file
        .file_name()
        .map_or_else(|| "gateway.log".to_string(), |n| n.to_string_lossy().into_owned());
    (dir, name)
}

/// Install the global subscriber
pub fn init(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose)))?;

    let file_layer = log_file.map(|path| {
        let (dir, name) = appender_target(path);
        fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::daily(dir, name))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert!(default_directives(0).contains("gateway_core=info"));
        assert!(default_directives(1).contains("gateway_core=debug"));
        assert!(default_directives(5).contains("gateway_core=trace"));
    }

    #[test]
    fn test_appender_target() {
        let (dir, name) = appender_target(Path::new("/var/log/gateway/requests.log"));
        assert_eq!(dir, PathBuf::from("/var/log/gateway"));
        assert_eq!(name, "requests.log");

        let (dir, name) = appender_target(Path::new("gateway.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "gateway.log");
    }
}
