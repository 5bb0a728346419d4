//! Fixed-capacity hash store with LRU ordering.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::config::Backend;
use crate::error::{Error, Result};
use crate::key::FlowKey;
use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

/// Table rows allocated per permitted session, keeping chains short when the
/// node cap is reached.
const TABLE_SLACK: f64 = 1.4;

/// Hash table of sessions with a hard cap on resident records.
///
/// The underlying LRU table is sized with slack above `max_nodes`, so it
/// never evicts on its own; the cap is enforced here and reported as
/// [`Error::Full`].
pub struct HashStore<D> {
    lru: LruCache<FlowKey, SessionRecord<D>>,
    max_nodes: usize,
}

impl<D> HashStore<D> {
    /// Create a store holding at most `max_sessions` records.
    pub fn new(max_sessions: usize) -> Self {
        let max_nodes = max_sessions.max(1);
        let rows = ((max_nodes as f64) * TABLE_SLACK).ceil() as usize + 1;
        let rows = NonZeroUsize::new(rows).unwrap_or(NonZeroUsize::MIN);

        Self {
            lru: LruCache::new(rows),
            max_nodes,
        }
    }

    /// Maximum number of resident records.
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Rows in the backing table.
    pub fn table_rows(&self) -> usize {
        self.lru.cap().get()
    }
}

impl<D> SessionStore<D> for HashStore<D> {
    fn backend(&self) -> Backend {
        Backend::Hash
    }

    fn len(&self) -> usize {
        self.lru.len()
    }

    fn is_full(&self) -> bool {
        self.lru.len() >= self.max_nodes
    }

    fn find(&self, key: &FlowKey) -> Option<&SessionRecord<D>> {
        self.lru.peek(key)
    }

    fn find_mut(&mut self, key: &FlowKey) -> Option<&mut SessionRecord<D>> {
        self.lru.peek_mut(key)
    }

    fn contains(&self, key: &FlowKey) -> bool {
        self.lru.contains(key)
    }

    fn touch(&mut self, key: &FlowKey) -> bool {
        if self.lru.contains(key) {
            self.lru.promote(key);
            true
        } else {
            false
        }
    }

    fn insert(&mut self, record: SessionRecord<D>) -> Result<&mut SessionRecord<D>> {
        let key = *record.flow_key();
        if self.lru.contains(&key) {
            return Err(Error::InvariantViolation(format!(
                "session already present for {key}"
            )));
        }
        if self.is_full() {
            return Err(Error::Full);
        }

        self.lru.put(key, record);
        trace!(flow = %key, count = self.lru.len(), "Session inserted into hash store");
        self.lru.peek_mut(&key).ok_or(Error::NotFound(key))
    }

    fn remove(&mut self, key: &FlowKey) -> Option<SessionRecord<D>> {
        self.lru.pop(key)
    }

    fn least_recent(&self) -> Option<&SessionRecord<D>> {
        self.lru.peek_lru().map(|(_, record)| record)
    }

    fn most_recent(&self) -> Option<&SessionRecord<D>> {
        self.lru.iter().next().map(|(_, record)| record)
    }

    fn lru_victim(&self, protected: Option<SessionId>) -> Option<&SessionRecord<D>> {
        self.lru
            .iter()
            .rev()
            .map(|(_, record)| record)
            .find(|record| Some(record.id()) != protected)
    }
}
