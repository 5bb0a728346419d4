//! Backing stores for session records.
//!
//! Both stores key records by the canonical [`FlowKey`] and keep a recency
//! order the eviction policies walk from the least recently used end.

mod hash;
mod tree;

pub use hash::HashStore;
pub use tree::TreeStore;

use crate::config::{Backend, CacheConfig};
use crate::error::{Error, Result};
use crate::key::FlowKey;
use crate::record::{SessionId, SessionRecord};

/// Storage abstraction shared by the hash and tree backends.
pub trait SessionStore<D> {
    /// Which backend this is.
    fn backend(&self) -> Backend;

    /// Number of resident records.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the store has no free slot for a new record.
    fn is_full(&self) -> bool;

    /// Look up a record without changing recency order.
    fn find(&self, key: &FlowKey) -> Option<&SessionRecord<D>>;

    /// Mutable lookup without changing recency order.
    fn find_mut(&mut self, key: &FlowKey) -> Option<&mut SessionRecord<D>>;

    /// Whether a record exists for `key`.
    fn contains(&self, key: &FlowKey) -> bool {
        self.find(key).is_some()
    }

    /// Move a record to the most recently used position.
    ///
    /// Returns `false` if no record exists for `key`.
    fn touch(&mut self, key: &FlowKey) -> bool;

    /// Insert a new record at the most recently used position.
    ///
    /// Fails with [`Error::Full`] when no slot is free; never evicts.
    fn insert(&mut self, record: SessionRecord<D>) -> Result<&mut SessionRecord<D>>;

    /// Remove and return the record for `key`.
    fn remove(&mut self, key: &FlowKey) -> Option<SessionRecord<D>>;

    /// The least recently used record.
    fn least_recent(&self) -> Option<&SessionRecord<D>>;

    /// The most recently used record.
    fn most_recent(&self) -> Option<&SessionRecord<D>>;

    /// Height of the search tree, for stores that keep one.
    fn tree_height(&self) -> Option<usize> {
        None
    }

    /// The least recently used record that is not `protected`.
    fn lru_victim(&self, protected: Option<SessionId>) -> Option<&SessionRecord<D>>;

    /// Return the record for `key`, allocating one with `make` if absent.
    fn get_or_alloc(
        &mut self,
        key: FlowKey,
        make: &mut dyn FnMut() -> SessionRecord<D>,
    ) -> Result<&mut SessionRecord<D>> {
        if self.contains(&key) {
            return self.find_mut(&key).ok_or(Error::NotFound(key));
        }

        let record = make();
        if *record.flow_key() != key {
            return Err(Error::InvariantViolation(format!(
                "allocated record for {} under key {}",
                record.flow_key(),
                key
            )));
        }
        self.insert(record)
    }
}

/// Build the store selected by `config`.
pub fn build_store<D: 'static>(config: &CacheConfig) -> Box<dyn SessionStore<D>> {
    match config.backend {
        Backend::Hash => Box::new(HashStore::new(config.max_sessions)),
        Backend::Tree => Box::new(TreeStore::new(config.max_splay_depth)),
    }
}
