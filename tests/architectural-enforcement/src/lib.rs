//! Architectural Enforcement Integration Tests
//!
//! Source scans over the gateway's production code. Currently one rule:
//! no sleep() calls (completion is awaited on channels, never polled).
//!
//! The checks live under `tests/`; this library only locates the sources.

use std::path::PathBuf;

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: [&str; 2] = ["gateway/core/src", "gateway/daemon/src"];

/// Absolute paths of the production source directories
#[must_use]
pub fn production_dirs() -> Vec<PathBuf> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    PRODUCTION_DIRS.iter().map(|dir| root.join(dir)).collect()
}
