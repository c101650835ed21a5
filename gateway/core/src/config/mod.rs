//! TOML Configuration File Support
//!
//! This module provides centralized configuration loading for the gateway,
//! supporting a TOML configuration file at `~/.config/split-gateway/gateway.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! port = 8250
//! base = "/dbs"
//!
//! [logging]
//! verbose = 1
//! log_file = "/var/log/split-gateway/gateway.log"
//!
//! [backend]
//! pool = ["http://dbs-1:8252/dbs", "http://dbs-2:8252/dbs"]
//! timeout_secs = 300
//! connect_timeout_ms = 5000
//!
//! [split]
//! scanner_buffer_size = 1048576
//! channel_capacity = 100
//! lower_bound_param = "min_cdate"
//! upper_bound_param = "max_cdate"
//! override_params = ["create_by", "min_cdate", "max_cdate"]
//!
//! [[split.api_redirects]]
//! api = "files"
//! timestamps = [1262304000, 1420070400, 1577836800]
//! ```
//!
//! Once loaded and validated, the file is frozen into [`GatewaySettings`],
//! which is immutable for the lifetime of the process.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::{BackendPool, SplitParams, SplitPlanner, SplitTable};
use crate::streaming::ExecutorConfig;

/// Default maximum length of a single NDJSON record (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8250;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerToml {
    /// Listening port
    pub port: Option<u16>,

    /// Listening address
    pub bind_address: Option<String>,

    /// Path prefix served by the gateway
    pub base: Option<String>,
}

/// Logging section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingToml {
    /// Verbosity level (0 = info, >0 = debug)
    pub verbose: Option<u8>,

    /// Log file prefix; rotated daily when set
    pub log_file: Option<PathBuf>,
}

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendToml {
    /// Base URLs of the data-service backends
    pub pool: Option<Vec<String>>,

    /// Ceiling for a single backend call, in seconds
    pub timeout_secs: Option<u64>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// One API whose requests are split on timestamp boundaries
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiRedirect {
    /// API name (final path segment)
    pub api: String,

    /// Strictly increasing boundary timestamps (seconds)
    #[serde(default)]
    pub timestamps: Vec<i64>,
}

/// Split section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitToml {
    /// Maximum length of one streamed record, in bytes
    pub scanner_buffer_size: Option<usize>,

    /// Capacity of the executor -> aggregator handoff channel
    pub channel_capacity: Option<usize>,

    /// Query parameter carrying the window's lower bound
    pub lower_bound_param: Option<String>,

    /// Query parameter carrying the window's upper bound
    pub upper_bound_param: Option<String>,

    /// Query keys that disable splitting when supplied by the client
    pub override_params: Option<Vec<String>>,

    /// API boundary table
    pub api_redirects: Vec<ApiRedirect>,
}

/// Root TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayToml {
    /// Server settings
    pub server: ServerToml,

    /// Logging settings
    pub logging: LoggingToml,

    /// Backend pool settings
    pub backend: BackendToml,

    /// Split settings
    pub split: SplitToml,
}

// =============================================================================
// Unified Configuration
// =============================================================================

/// Complete gateway configuration, merged from all sources
#[derive(Clone, Debug)]
pub struct GatewayConfigFile {
    /// Listening port
    pub port: u16,

    /// Listening address
    pub bind_address: String,

    /// Path prefix served by the gateway ("" serves every path)
    pub base: String,

    /// Verbosity level
    pub verbose: u8,

    /// Optional log file prefix
    pub log_file: Option<PathBuf>,

    /// Backend base URLs
    pub backends: Vec<String>,

    /// API boundary table
    pub api_redirects: Vec<ApiRedirect>,

    /// Maximum record length in bytes
    pub scanner_buffer_size: usize,

    /// Handoff channel capacity
    pub channel_capacity: usize,

    /// Per-backend-call ceiling in seconds
    pub backend_timeout_secs: u64,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Lower-bound query parameter name
    pub lower_bound_param: String,

    /// Upper-bound query parameter name
    pub upper_bound_param: String,

    /// Query keys that disable splitting
    pub override_params: Vec<String>,

    /// Source of the configuration (for debugging)
    source: ConfigSource,

    /// Path to the loaded config file (if any)
    config_file_path: Option<PathBuf>,
}

impl Default for GatewayConfigFile {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            base: String::new(),
            verbose: 0,
            log_file: None,
            backends: Vec::new(),
            api_redirects: Vec::new(),
            scanner_buffer_size: DEFAULT_BUFFER_SIZE,
            channel_capacity: 100,
            backend_timeout_secs: 300,
            connect_timeout_ms: 5_000,
            lower_bound_param: "min_cdate".to_string(),
            upper_bound_param: "max_cdate".to_string(),
            override_params: vec![
                "create_by".to_string(),
                "min_cdate".to_string(),
                "max_cdate".to_string(),
            ],
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl GatewayConfigFile {
    /// Create a new configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the configuration source
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Get the config file path, if one was loaded
    #[must_use]
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Listening address as `host:port`
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Check the configuration for values that would make the gateway unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend pool must contain at least one backend".into(),
            ));
        }

        for backend in &self.backends {
            match reqwest::Url::parse(backend) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => {
                    return Err(ConfigError::ValidationError(format!(
                        "backend {backend} uses unsupported scheme {}",
                        url.scheme()
                    )));
                }
                Err(e) => {
                    return Err(ConfigError::ValidationError(format!(
                        "backend {backend} is not a valid URL: {e}"
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for redirect in &self.api_redirects {
            if redirect.api.is_empty() || redirect.api.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "api name {:?} must be a single non-empty path segment",
                    redirect.api
                )));
            }
            if !seen.insert(redirect.api.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "api {} is configured more than once",
                    redirect.api
                )));
            }
            if redirect.timestamps.iter().any(|ts| *ts < 0) {
                return Err(ConfigError::ValidationError(format!(
                    "api {} has a negative timestamp",
                    redirect.api
                )));
            }
            if redirect.timestamps.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(ConfigError::ValidationError(format!(
                    "api {} timestamps must be strictly increasing",
                    redirect.api
                )));
            }
        }

        if self.scanner_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "scanner_buffer_size must be positive".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be positive".into(),
            ));
        }
        if self.lower_bound_param.is_empty() || self.upper_bound_param.is_empty() {
            return Err(ConfigError::ValidationError(
                "window bound parameter names must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Validate and freeze into the immutable runtime settings
    ///
    /// # Errors
    ///
    /// Returns an error if [`validate`](Self::validate) fails.
    pub fn into_settings(self) -> Result<GatewaySettings, ConfigError> {
        self.validate()?;

        let pool = BackendPool::new(self.backends).ok_or_else(|| {
            ConfigError::ValidationError("backend pool must not be empty".into())
        })?;

        let table = SplitTable::from_redirects(self.api_redirects);
        let params = SplitParams {
            lower_bound_param: self.lower_bound_param,
            upper_bound_param: self.upper_bound_param,
            override_params: self.override_params,
        };

        Ok(GatewaySettings {
            base: normalize_base(&self.base),
            pool,
            planner: SplitPlanner::new(table, params),
            executor: ExecutorConfig {
                max_line_bytes: self.scanner_buffer_size,
                request_timeout: Duration::from_secs(self.backend_timeout_secs),
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                channel_capacity: self.channel_capacity,
            },
        })
    }
}

/// Strip a trailing slash so `/dbs/` and `/dbs` behave the same
fn normalize_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

// =============================================================================
// Runtime Settings
// =============================================================================

/// Immutable, validated settings shared by every request handler
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    /// Path prefix served by the gateway
    pub base: String,
    /// Backend pool (non-empty)
    pub pool: BackendPool,
    /// Split planner holding the API boundary table
    pub planner: SplitPlanner,
    /// Sub-request executor limits
    pub executor: ExecutorConfig,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/split-gateway/gateway.toml` or
/// `~/.config/split-gateway/gateway.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("split-gateway").join("gateway.toml"))
}

/// Load configuration from the default path
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<GatewayConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<GatewayConfigFile, ConfigError> {
    let mut config = GatewayConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: GatewayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut GatewayConfigFile, toml: GatewayToml) {
    if let Some(port) = toml.server.port {
        config.port = port;
    }
    if let Some(addr) = toml.server.bind_address {
        config.bind_address = addr;
    }
    if let Some(base) = toml.server.base {
        config.base = base;
    }

    if let Some(verbose) = toml.logging.verbose {
        config.verbose = verbose;
    }
    if toml.logging.log_file.is_some() {
        config.log_file = toml.logging.log_file;
    }

    if let Some(pool) = toml.backend.pool {
        config.backends = pool;
    }
    if let Some(secs) = toml.backend.timeout_secs {
        config.backend_timeout_secs = secs;
    }
    if let Some(ms) = toml.backend.connect_timeout_ms {
        config.connect_timeout_ms = ms;
    }

    // 0 keeps the default, matching the legacy config semantics
    if let Some(size) = toml.split.scanner_buffer_size.filter(|s| *s > 0) {
        config.scanner_buffer_size = size;
    }
    if let Some(capacity) = toml.split.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(param) = toml.split.lower_bound_param {
        config.lower_bound_param = param;
    }
    if let Some(param) = toml.split.upper_bound_param {
        config.upper_bound_param = param;
    }
    if let Some(params) = toml.split.override_params {
        config.override_params = params;
    }
    config.api_redirects = toml.split.api_redirects;
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut GatewayConfigFile) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using an arbitrary variable lookup
///
/// Environment variables:
/// - `GATEWAY_PORT`: Listening port
/// - `GATEWAY_BACKENDS`: Comma-separated backend URLs
/// - `GATEWAY_VERBOSE`: Verbosity level
/// - `GATEWAY_BUFFER_SIZE`: Maximum record length in bytes
fn apply_env_from<F>(config: &mut GatewayConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(port) = lookup("GATEWAY_PORT").and_then(|v| v.parse().ok()) {
        config.port = port;
        applied = true;
    }

    if let Some(backends) = lookup("GATEWAY_BACKENDS") {
        let pool: Vec<String> = backends
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect();
        if !pool.is_empty() {
            config.backends = pool;
            applied = true;
        }
    }

    if let Some(verbose) = lookup("GATEWAY_VERBOSE").and_then(|v| v.parse().ok()) {
        config.verbose = verbose;
        applied = true;
    }

    if let Some(size) = lookup("GATEWAY_BUFFER_SIZE")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|s| *s > 0)
    {
        config.scanner_buffer_size = size;
        applied = true;
    }

    if applied {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Port override
    pub port: Option<u16>,

    /// Backend pool override
    pub backends: Option<Vec<String>>,

    /// Verbosity override
    pub verbose: Option<u8>,

    /// Log file override
    pub log_file: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set backend pool override
    #[must_use]
    pub fn with_backends(mut self, backends: Vec<String>) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Set verbosity override
    #[must_use]
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Set log file override
    #[must_use]
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut GatewayConfigFile) {
        let mut applied = false;

        if let Some(port) = self.port {
            config.port = port;
            applied = true;
        }
        if let Some(ref backends) = self.backends {
            if !backends.is_empty() {
                config.backends = backends.clone();
                applied = true;
            }
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
            applied = true;
        }
        if let Some(ref path) = self.log_file {
            config.log_file = Some(path.clone());
            applied = true;
        }

        if applied {
            config.source = ConfigSource::Cli;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
