//! Backend Selector
//!
//! Picks one backend base address per incoming request, uniformly at random.

use rand::seq::SliceRandom;
use rand::Rng;

/// Immutable pool of backend base addresses
///
/// The pool is guaranteed non-empty; an empty pool is a configuration
/// error reported at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendPool {
    backends: Vec<String>,
}

impl BackendPool {
    /// Build a pool, returning `None` if `backends` is empty
    #[must_use]
    pub fn new(backends: Vec<String>) -> Option<Self> {
        if backends.is_empty() {
            return None;
        }
        let backends = backends
            .into_iter()
            .map(|b| b.trim_end_matches('/').to_string())
            .collect();
        Some(Self { backends })
    }

    /// Number of backends in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; kept for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// All backends, in configuration order
    #[must_use]
    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    /// Pick a backend using the thread-local RNG
    #[must_use]
    pub fn select(&self) -> &str {
        self.select_with(&mut rand::thread_rng())
    }

    /// Pick a backend using the supplied RNG (seedable for tests)
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // Non-empty by construction
        self.backends
            .choose(rng)
            .map_or(self.backends[0].as_str(), String::as_str)
    }
}
