//! Gateway Core - Request-Splitting Fan-Out / Fan-In Engine
//!
//! This crate sits in front of a pool of data-service backends. A client
//! issues one read request for a named API; the gateway may split it into
//! several time-windowed sub-requests against one backend, run them
//! concurrently, and stream the union of their NDJSON records back as a
//! single JSON array.
//!
//! # Architecture
//!
//! ```text
//!   client request
//!         │
//!         v
//!  ┌─────────────┐   ┌──────────────┐
//!  │ BackendPool │──>│ SplitPlanner │
//!  └─────────────┘   └──────┬───────┘
//!                 split ┌───┴───┐ no split
//!                       v       v
//!             ┌─────────────┐ ┌──────────────────────┐
//!             │ SplitEngine │ │ PassThroughForwarder │
//!             └──────┬──────┘ └──────────────────────┘
//!        ┌───────────┼───────────┐
//!        v           v           v
//!   SubRequestExecutor × N (one per window)
//!        └───────────┼───────────┘
//!                    v
//!           StreamAggregator ──> client
//! ```
//!
//! # Key Types
//!
//! - [`Gateway`]: Request handler wiring everything together
//! - [`GatewayConfigFile`]: Configuration merged from file, env and CLI
//! - [`SplitPlanner`]: Decides split-or-not and builds windows
//! - [`SplitEngine`]: Per-request fan-out control task
//! - [`StreamAggregator`]: Sole writer of the aggregate document
//!
//! # Quick Start
//!
//! ```ignore
//! use gateway_core::{config::load_config, Gateway};
//!
//! let settings = load_config()?.into_settings()?;
//! let gateway = Gateway::new(settings)?;
//! let response = gateway.handle(request).await;
//! ```

pub mod config;
pub mod gateway;
pub mod proxy;
pub mod routing;
pub mod streaming;

pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, GatewayConfigFile,
    GatewaySettings,
};
pub use gateway::{Gateway, GatewayError};
pub use proxy::{ClientAddr, GatewayBody, PassThroughForwarder};
pub use routing::{BackendPool, PlanDecision, SplitPlan, SplitPlanner, Window};
pub use streaming::{SplitEngine, SplitSummary, StreamAggregator, SubRequestExecutor};
