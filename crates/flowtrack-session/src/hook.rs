//! Hooks connecting the cache to the preprocessor that owns session payloads.
//!
//! The cache decides *which* sessions leave the store; the hook is told about
//! every departure and owns the memory counter the eviction policies read.
//! The associated `Payload` type is the preprocessor's per-flow state.

use crate::error::Result;
use crate::record::SessionRecord;
use crate::time::Timestamp;

/// Trait for the preprocessor side of the session cache.
pub trait SessionHook {
    /// Per-flow state stored in each [`SessionRecord`].
    type Payload: Default;

    /// Called after a new session has been inserted.
    fn on_create(&mut self, _record: &SessionRecord<Self::Payload>) {}

    /// Called before a session is evicted by a sweep or purge.
    ///
    /// Errors are logged by the caller; the session is evicted regardless.
    fn on_evict(&mut self, _record: &SessionRecord<Self::Payload>, _now: Timestamp) -> Result<()> {
        Ok(())
    }

    /// Called when a session is explicitly removed.
    fn on_remove(&mut self, _record: &SessionRecord<Self::Payload>) {}

    /// Bytes currently attributed to cached sessions.
    fn memory_used(&self) -> u64;
}

/// Default hook charging a fixed number of bytes per live session.
#[derive(Debug, Clone)]
pub struct MemoryAccounting {
    bytes_per_session: u64,
    used: u64,
}

/// Default fixed cost of one session in bytes.
pub const DEFAULT_BYTES_PER_SESSION: u64 = 512;

impl MemoryAccounting {
    /// Create an accounting hook with the given per-session cost.
    pub fn new(bytes_per_session: u64) -> Self {
        Self {
            bytes_per_session,
            used: 0,
        }
    }

    /// Fixed cost charged per session.
    pub fn bytes_per_session(&self) -> u64 {
        self.bytes_per_session
    }

    fn release(&mut self) {
        self.used = self.used.saturating_sub(self.bytes_per_session);
    }
}

impl Default for MemoryAccounting {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES_PER_SESSION)
    }
}

impl SessionHook for MemoryAccounting {
    type Payload = Vec<u8>;

    fn on_create(&mut self, _record: &SessionRecord<Vec<u8>>) {
        self.used = self.used.saturating_add(self.bytes_per_session);
    }

    fn on_evict(&mut self, _record: &SessionRecord<Vec<u8>>, _now: Timestamp) -> Result<()> {
        self.release();
        Ok(())
    }

    fn on_remove(&mut self, _record: &SessionRecord<Vec<u8>>) {
        self.release();
    }

    fn memory_used(&self) -> u64 {
        self.used
    }
}
