//! Configuration for the session cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum number of sessions to cache.
pub const DEFAULT_MAX_SESSIONS: usize = 8192;

/// Default idle timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default memory cap in bytes.
pub const DEFAULT_MEMCAP: u64 = 8 * 1024 * 1024;

/// Default number of sessions reclaimed per batch pass.
pub const DEFAULT_CACHE_CLEAN_SESSIONS: usize = 5;

/// Default splay descent depth before the tree is rebuilt.
pub const DEFAULT_MAX_SPLAY_DEPTH: usize = 64;

/// Which structure backs the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Fixed-capacity hash table with LRU ordering.
    #[default]
    Hash,
    /// Splay tree with an auxiliary recency list.
    Tree,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Hash => f.write_str("hash"),
            Backend::Tree => f.write_str("tree"),
        }
    }
}

/// Configuration for the session cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Backing store.
    pub backend: Backend,

    /// Sessions idle for at least this long are pruned by the timeout sweep.
    pub timeout: Duration,

    /// Upper bound on memory reported by the session hook.
    pub memcap: u64,

    /// Maximum number of live sessions.
    pub max_sessions: usize,

    /// Sessions evicted per pass of the batch reclaim.
    pub cache_clean_sessions: usize,

    /// Fraction of `max_sessions` to free in percentage mode; zero selects
    /// batch mode.
    pub cache_clean_percent: f32,

    /// Deepest splay descent tolerated before a full rebalance (tree only).
    pub max_splay_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            timeout: DEFAULT_TIMEOUT,
            memcap: DEFAULT_MEMCAP,
            max_sessions: DEFAULT_MAX_SESSIONS,
            cache_clean_sessions: DEFAULT_CACHE_CLEAN_SESSIONS,
            cache_clean_percent: 0.0,
            max_splay_depth: DEFAULT_MAX_SPLAY_DEPTH,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the backing store.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the memory cap.
    pub fn with_memcap(mut self, memcap: u64) -> Self {
        self.memcap = memcap;
        self
    }

    /// Set the maximum number of sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the batch size of the fixed-batch reclaim.
    pub fn with_cache_clean_sessions(mut self, count: usize) -> Self {
        self.cache_clean_sessions = count;
        self
    }

    /// Set the percentage reclaim fraction (zero selects batch mode).
    pub fn with_cache_clean_percent(mut self, percent: f32) -> Self {
        self.cache_clean_percent = percent;
        self
    }

    /// Set the splay depth limit.
    pub fn with_max_splay_depth(mut self, depth: usize) -> Self {
        self.max_splay_depth = depth;
        self
    }

    /// Whether the percentage reclaim policy is selected.
    pub fn uses_percent_reclaim(&self) -> bool {
        self.cache_clean_percent > 0.0
    }

    /// Amount the percentage reclaim frees, as bytes below the memcap and as
    /// sessions below `max_sessions`.
    pub fn percent_target(&self) -> u64 {
        (self.max_sessions as f64 * f64::from(self.cache_clean_percent)) as u64
    }

    /// Check the configuration for values the eviction policies cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(Error::InvalidConfig("max_sessions must be at least 1".into()));
        }
        if self.cache_clean_sessions == 0 {
            return Err(Error::InvalidConfig(
                "cache_clean_sessions must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.cache_clean_percent) {
            return Err(Error::InvalidConfig(format!(
                "cache_clean_percent must be in [0, 1), got {}",
                self.cache_clean_percent
            )));
        }
        if self.max_splay_depth < 2 {
            return Err(Error::InvalidConfig("max_splay_depth must be at least 2".into()));
        }
        Ok(())
    }
}
