//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]                # session cache sizing and eviction
//! [logging]                # optional JSON log file
//! ```

use std::path::PathBuf;
use std::time::Duration;

use flowtrack_session::{
    Backend, CacheConfig, DEFAULT_BYTES_PER_SESSION, DEFAULT_CACHE_CLEAN_SESSIONS,
    DEFAULT_MAX_SESSIONS, DEFAULT_MAX_SPLAY_DEPTH, DEFAULT_MEMCAP, DEFAULT_TIMEOUT,
    MemoryAccounting,
};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowtrackConfig {
    /// Session cache configuration.
    pub session: Option<SessionSection>,

    /// Log output configuration.
    pub logging: Option<LoggingSection>,
}

impl FlowtrackConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: FlowtrackConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The session section, or defaults if absent.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// The logging section, or defaults if absent.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Fill in every section so the effective configuration can be shown.
    pub fn resolved(&self) -> Self {
        Self {
            session: Some(self.session()),
            logging: Some(self.logging()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session cache configuration.
///
/// ```toml
/// [session]
/// backend = "hash"
/// timeout_secs = 30
/// memcap = 8388608
/// max_sessions = 8192
/// cache_clean_sessions = 5
/// cache_clean_percent = 0.0
/// max_splay_depth = 64
/// bytes_per_session = 512
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Backing store: `hash` or `tree`.
    pub backend: Backend,
    /// Idle timeout in seconds.
    pub timeout_secs: u64,
    /// Memory cap in bytes.
    pub memcap: u64,
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Sessions evicted per batch reclaim pass.
    pub cache_clean_sessions: usize,
    /// Fraction of `max_sessions` to free per reclaim; zero selects batch mode.
    pub cache_clean_percent: f32,
    /// Splay descent depth that triggers a rebuild (tree backend).
    pub max_splay_depth: usize,
    /// Bytes charged against the memcap for each live session.
    pub bytes_per_session: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            memcap: DEFAULT_MEMCAP,
            max_sessions: DEFAULT_MAX_SESSIONS,
            cache_clean_sessions: DEFAULT_CACHE_CLEAN_SESSIONS,
            cache_clean_percent: 0.0,
            max_splay_depth: DEFAULT_MAX_SPLAY_DEPTH,
            bytes_per_session: DEFAULT_BYTES_PER_SESSION,
        }
    }
}

impl SessionSection {
    /// Build a validated cache configuration from this section.
    pub fn to_cache_config(&self) -> crate::Result<CacheConfig> {
        let config = CacheConfig::new()
            .with_backend(self.backend)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_memcap(self.memcap)
            .with_max_sessions(self.max_sessions)
            .with_cache_clean_sessions(self.cache_clean_sessions)
            .with_cache_clean_percent(self.cache_clean_percent)
            .with_max_splay_depth(self.max_splay_depth);
        config.validate()?;
        Ok(config)
    }

    /// Memory accounting hook charging `bytes_per_session`.
    pub fn memory_accounting(&self) -> MemoryAccounting {
        MemoryAccounting::new(self.bytes_per_session)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log output configuration.
///
/// ```toml
/// [logging]
/// json_dir = "/var/log/flowtrack"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory for a daily-rotated JSON log file. Disabled when unset.
    pub json_dir: Option<PathBuf>,
}
