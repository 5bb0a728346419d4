//! Bounded session cache for TCP flow tracking.
//!
//! This crate maps every packet to the session of its bidirectional flow with:
//! - Direction-independent [`FlowKey`]s
//! - A fixed-capacity hash store or a splay-tree store behind one trait
//! - Idle-timeout, batch and percentage eviction that never removes the
//!   session currently being processed
//! - A [`SessionHook`] through which the owner of session payloads tracks
//!   memory and is told about every eviction
//!
//! # Example
//!
//! ```rust,ignore
//! use flowtrack_session::{CacheConfig, Endpoint, SessionCache, Timestamp};
//!
//! let config = CacheConfig::default()
//!     .with_max_sessions(1000)
//!     .with_timeout(Duration::from_secs(30));
//!
//! let mut cache = SessionCache::new(config)?;
//! let session = cache.get_or_create(client, server, Timestamp::from_secs(ts))?;
//! ```

mod cache;
mod config;
mod error;
pub mod eviction;
mod hook;
mod key;
mod record;
pub mod store;
mod time;

pub use cache::{CacheStats, SessionCache};
pub use config::{
    Backend, CacheConfig, DEFAULT_CACHE_CLEAN_SESSIONS, DEFAULT_MAX_SESSIONS,
    DEFAULT_MAX_SPLAY_DEPTH, DEFAULT_MEMCAP, DEFAULT_TIMEOUT,
};
pub use error::{Error, Result};
pub use hook::{DEFAULT_BYTES_PER_SESSION, MemoryAccounting, SessionHook};
pub use key::{Endpoint, FlowKey};
pub use record::{SessionId, SessionRecord};
pub use store::{HashStore, SessionStore, TreeStore};
pub use time::Timestamp;
