//! Flow session cache with bounded capacity and idle-timeout eviction.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{Backend, CacheConfig};
use crate::error::{Error, Result};
use crate::eviction;
use crate::hook::{MemoryAccounting, SessionHook};
use crate::key::{Endpoint, FlowKey};
use crate::record::{SessionId, SessionRecord};
use crate::store::{SessionStore, build_store};
use crate::time::Timestamp;

/// Session cache for TCP flows.
///
/// This cache provides:
/// - Direction-independent lookup of the session for a packet
/// - A hard limit on live sessions and on memory reported by the hook
/// - Idle-timeout pruning, then batch or percentage reclaim, when a new
///   session needs room
/// - A protected session that no eviction will touch
///
/// The cache is single-threaded; every mutating call takes `&mut self`, so
/// references returned by lookups cannot outlive the next mutation.
pub struct SessionCache<H: SessionHook = MemoryAccounting> {
    store: Box<dyn SessionStore<H::Payload>>,
    hook: H,
    config: CacheConfig,
    protected: Option<SessionId>,
    next_id: u64,
    created: u64,
    removed: u64,
    evicted: u64,
}

impl SessionCache<MemoryAccounting> {
    /// Create a cache that charges a fixed cost per session.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_hook(config, MemoryAccounting::default())
    }
}

impl<H> SessionCache<H>
where
    H: SessionHook,
    H::Payload: 'static,
{
    /// Create a cache with a custom hook.
    pub fn with_hook(config: CacheConfig, hook: H) -> Result<Self> {
        config.validate()?;
        let store = build_store(&config);

        debug!(
            backend = %config.backend,
            max_sessions = config.max_sessions,
            memcap = config.memcap,
            timeout_secs = config.timeout.as_secs(),
            "Session cache initialized"
        );

        Ok(Self {
            store,
            hook,
            config,
            protected: None,
            next_id: 1,
            created: 0,
            removed: 0,
            evicted: 0,
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The active backend.
    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    /// The session hook.
    pub fn hook(&self) -> &H {
        &self.hook
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.store.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Memory currently reported by the hook.
    pub fn memory_used(&self) -> u64 {
        self.hook.memory_used()
    }

    /// Mark the session being processed; no eviction will remove it.
    ///
    /// Replaces any previous marker.
    pub fn protect(&mut self, id: SessionId) {
        self.protected = Some(id);
    }

    /// Clear the protected marker.
    pub fn release(&mut self) {
        self.protected = None;
    }

    /// The currently protected session, if any.
    pub fn protected(&self) -> Option<SessionId> {
        self.protected
    }

    /// Look up the session for a packet between `a` and `b`.
    ///
    /// A hit marks the session as most recently used.
    pub fn lookup(&mut self, a: Endpoint, b: Endpoint) -> Option<&SessionRecord<H::Payload>> {
        self.lookup_key(&FlowKey::derive(a, b))
    }

    /// Look up a session by key, marking it most recently used.
    pub fn lookup_key(&mut self, key: &FlowKey) -> Option<&SessionRecord<H::Payload>> {
        if !self.store.touch(key) {
            trace!(flow = %key, "Session cache miss");
            return None;
        }
        trace!(flow = %key, "Session found in cache");
        self.store.find(key)
    }

    /// Peek at a session without updating recency order.
    pub fn peek(&self, key: &FlowKey) -> Option<&SessionRecord<H::Payload>> {
        self.store.find(key)
    }

    /// Mutable access to a session without updating recency order.
    pub fn get_mut(&mut self, key: &FlowKey) -> Option<&mut SessionRecord<H::Payload>> {
        self.store.find_mut(key)
    }

    /// Record packet activity on a session.
    ///
    /// Moves it to the most recently used position and advances its
    /// activity timestamp. Returns `false` if the session does not exist.
    pub fn touch(&mut self, key: &FlowKey, now: Timestamp) -> bool {
        if !self.store.touch(key) {
            return false;
        }
        if let Some(record) = self.store.find_mut(key) {
            record.touch(now);
        }
        true
    }

    /// Get the session for a packet, creating it if needed.
    ///
    /// On a miss with the cache at capacity or over its memcap, idle sessions
    /// are pruned first; only if that does not make room is the configured
    /// capacity reclaim run. A new session records `a` as its client.
    pub fn get_or_create(
        &mut self,
        a: Endpoint,
        b: Endpoint,
        now: Timestamp,
    ) -> Result<&mut SessionRecord<H::Payload>> {
        let key = FlowKey::derive(a, b);

        if self.store.touch(&key) {
            trace!(flow = %key, "Session found in cache");
            return self.store.find_mut(&key).ok_or(Error::NotFound(key));
        }

        if self.needs_room() {
            debug!(
                flow = %key,
                count = self.store.len(),
                memory_used = self.hook.memory_used(),
                "Session cache full, pruning idle sessions"
            );
            self.evicted += eviction::sweep_idle(
                self.store.as_mut(),
                &mut self.hook,
                now,
                self.protected,
                self.config.timeout,
            ) as u64;

            if self.needs_room() {
                debug!(flow = %key, "No idle sessions to prune, reclaiming capacity");
                self.evicted += eviction::reclaim(
                    self.store.as_mut(),
                    &mut self.hook,
                    now,
                    self.protected,
                    &self.config,
                ) as u64;
            }

            if self.at_capacity() {
                warn!(
                    flow = %key,
                    count = self.store.len(),
                    protected = ?self.protected,
                    "Session cache full, cannot create session"
                );
                return Err(Error::Full);
            }
        }

        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        let record = SessionRecord::new(id, a, b, now, H::Payload::default());

        let record = self.store.insert(record)?;
        self.hook.on_create(record);
        self.created += 1;
        trace!(flow = %key, session = %id, "Session created");

        Ok(record)
    }

    /// Tear down a session explicitly, bypassing eviction policy.
    ///
    /// Fails with [`Error::InvariantViolation`] if the session is protected.
    pub fn remove(&mut self, key: &FlowKey) -> Result<SessionRecord<H::Payload>> {
        let record = self.store.find(key).ok_or(Error::NotFound(*key))?;
        if Some(record.id()) == self.protected {
            return Err(Error::InvariantViolation(format!(
                "cannot remove protected session {} ({key})",
                record.id()
            )));
        }

        let record = self.store.remove(key).ok_or(Error::NotFound(*key))?;
        self.hook.on_remove(&record);
        self.removed += 1;
        debug!(flow = %key, session = %record.id(), "Session removed");

        Ok(record)
    }

    /// Prune sessions idle for at least the configured timeout.
    ///
    /// `protected` overrides the cache's own marker for this call.
    pub fn prune_for_time(&mut self, now: Timestamp, protected: Option<SessionId>) -> usize {
        let protected = protected.or(self.protected);
        let pruned = eviction::sweep_idle(
            self.store.as_mut(),
            &mut self.hook,
            now,
            protected,
            self.config.timeout,
        );
        self.evicted += pruned as u64;
        pruned
    }

    /// Run the capacity reclaim policy regardless of idle time.
    ///
    /// Used when memory pressure is detected outside of session creation.
    pub fn prune_for_memory(&mut self, now: Timestamp, protected: Option<SessionId>) -> usize {
        let protected = protected.or(self.protected);
        let pruned = eviction::reclaim(
            self.store.as_mut(),
            &mut self.hook,
            now,
            protected,
            &self.config,
        );
        self.evicted += pruned as u64;
        pruned
    }

    /// Evict every session, ignoring the protected marker.
    pub fn purge(&mut self, now: Timestamp) -> usize {
        self.protected = None;
        let purged = eviction::purge(self.store.as_mut(), &mut self.hook, now);
        self.evicted += purged as u64;
        debug!(purged, "Session cache purged");
        purged
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.store.len(),
            memory_used: self.hook.memory_used(),
            max_sessions: self.config.max_sessions,
            memcap: self.config.memcap,
            backend: self.store.backend(),
            created: self.created,
            removed: self.removed,
            evicted: self.evicted,
        }
    }

    /// Log the active session count and memory in use.
    pub fn log_summary(&self) {
        debug!(
            count = self.store.len(),
            memory_used = self.hook.memory_used(),
            "{} streams active, {} bytes in use",
            self.store.len(),
            self.hook.memory_used()
        );
    }

    fn at_capacity(&self) -> bool {
        self.store.is_full() || self.store.len() >= self.config.max_sessions
    }

    fn needs_room(&self) -> bool {
        self.at_capacity() || self.hook.memory_used() > self.config.memcap
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of live sessions.
    pub count: usize,

    /// Memory reported by the hook.
    pub memory_used: u64,

    /// Maximum number of live sessions.
    pub max_sessions: usize,

    /// Memory cap.
    pub memcap: u64,

    /// Backing store.
    pub backend: Backend,

    /// Sessions created since the cache was built.
    pub created: u64,

    /// Sessions removed explicitly.
    pub removed: u64,

    /// Sessions evicted by sweeps, reclaims and purges.
    pub evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn ep(ip: u32, port: u16) -> Endpoint {
        Endpoint::new(ip, port)
    }

    fn flow(n: u32) -> (Endpoint, Endpoint) {
        (ep(0x0a00_0000 + n, 40000), ep(0xc0a8_0101, 80))
    }

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn both_backends(config: CacheConfig) -> Vec<SessionCache> {
        vec![
            SessionCache::new(config.clone()).unwrap(),
            SessionCache::new(config.with_backend(Backend::Tree)).unwrap(),
        ]
    }

    #[test]
    fn test_create_and_lookup() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            let id = cache.get_or_create(a, b, ts(0)).unwrap().id();

            let found = cache.lookup(a, b).unwrap();
            assert_eq!(found.id(), id);
            assert_eq!(found.client, a);
            assert_eq!(found.server, b);
        }
    }

    #[test]
    fn test_reverse_direction_finds_same_session() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            let first = cache.get_or_create(a, b, ts(0)).unwrap().id();
            let second = cache.get_or_create(b, a, ts(1)).unwrap().id();

            assert_eq!(first, second);
            assert_eq!(cache.count(), 1);
            assert_eq!(cache.lookup(b, a).map(|r| r.id()), Some(first));
        }
    }

    #[test]
    fn test_lru_eviction_scenario() {
        let config = CacheConfig::new()
            .with_max_sessions(2)
            .with_cache_clean_sessions(1)
            .with_timeout(Duration::from_secs(60));

        for mut cache in both_backends(config) {
            let (a1, b1) = flow(1);
            let (a2, b2) = flow(2);
            let (a3, b3) = flow(3);

            cache.get_or_create(a1, b1, ts(0)).unwrap();
            cache.get_or_create(a2, b2, ts(1)).unwrap();
            cache.get_or_create(a3, b3, ts(2)).unwrap();

            assert_eq!(cache.count(), 2);
            assert!(cache.lookup(a1, b1).is_none());
            assert!(cache.lookup(a2, b2).is_some());
            assert!(cache.lookup(a3, b3).is_some());
            assert_eq!(cache.stats().evicted, 1);
        }
    }

    #[test]
    fn test_lookup_updates_order() {
        let config = CacheConfig::new()
            .with_max_sessions(3)
            .with_cache_clean_sessions(1);

        for mut cache in both_backends(config) {
            for n in 1..=3 {
                let (a, b) = flow(n);
                cache.get_or_create(a, b, ts(0)).unwrap();
            }

            let (a1, b1) = flow(1);
            assert!(cache.lookup(a1, b1).is_some());

            let (a4, b4) = flow(4);
            cache.get_or_create(a4, b4, ts(1)).unwrap();

            assert!(cache.lookup(a1, b1).is_some());
            let (a2, b2) = flow(2);
            assert!(cache.lookup(a2, b2).is_none());
        }
    }

    #[test]
    fn test_idle_sessions_preferred_over_reclaim() {
        let config = CacheConfig::new()
            .with_max_sessions(3)
            .with_cache_clean_sessions(2)
            .with_timeout(Duration::from_secs(30));

        for mut cache in both_backends(config) {
            let (a1, b1) = flow(1);
            let (a2, b2) = flow(2);
            let (a3, b3) = flow(3);
            cache.get_or_create(a1, b1, ts(0)).unwrap();
            cache.get_or_create(a2, b2, ts(100)).unwrap();
            cache.get_or_create(a3, b3, ts(101)).unwrap();

            let (a4, b4) = flow(4);
            cache.get_or_create(a4, b4, ts(102)).unwrap();

            // Only the idle session was evicted; a batch reclaim of two
            // would also have taken flow 2.
            assert!(cache.lookup(a1, b1).is_none());
            assert!(cache.lookup(a2, b2).is_some());
            assert_eq!(cache.count(), 3);
        }
    }

    #[test]
    fn test_protected_session_survives_creation_pressure() {
        let config = CacheConfig::new()
            .with_max_sessions(2)
            .with_cache_clean_sessions(1);

        for mut cache in both_backends(config) {
            let (a1, b1) = flow(1);
            let (a2, b2) = flow(2);
            let id1 = cache.get_or_create(a1, b1, ts(0)).unwrap().id();
            cache.get_or_create(a2, b2, ts(0)).unwrap();
            cache.protect(id1);

            let (a3, b3) = flow(3);
            cache.get_or_create(a3, b3, ts(1)).unwrap();

            assert_eq!(cache.lookup(a1, b1).map(|r| r.id()), Some(id1));
            assert!(cache.lookup(a2, b2).is_none());
        }
    }

    #[test]
    fn test_full_when_only_protected_remains() {
        let config = CacheConfig::new().with_max_sessions(1);

        for mut cache in both_backends(config) {
            let (a1, b1) = flow(1);
            let id = cache.get_or_create(a1, b1, ts(0)).unwrap().id();
            cache.protect(id);

            let (a2, b2) = flow(2);
            let result = cache.get_or_create(a2, b2, ts(1000));
            assert!(matches!(result, Err(Error::Full)));
            assert_eq!(cache.count(), 1);

            cache.release();
            assert!(cache.get_or_create(a2, b2, ts(1000)).is_ok());
            assert_eq!(cache.count(), 1);
        }
    }

    #[test]
    fn test_remove_then_lookup_misses() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            cache.get_or_create(a, b, ts(0)).unwrap();
            let key = FlowKey::derive(a, b);

            let removed = cache.remove(&key).unwrap();
            assert_eq!(*removed.flow_key(), key);
            assert!(cache.lookup(a, b).is_none());
            assert!(matches!(cache.remove(&key), Err(Error::NotFound(_))));
            assert_eq!(cache.memory_used(), 0);
        }
    }

    #[test]
    fn test_remove_protected_is_rejected() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            let id = cache.get_or_create(a, b, ts(0)).unwrap().id();
            cache.protect(id);

            let result = cache.remove(&FlowKey::derive(a, b));
            assert!(matches!(result, Err(Error::InvariantViolation(_))));
            assert_eq!(cache.count(), 1);
        }
    }

    #[test]
    fn test_session_ids_are_not_reused() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            let first = cache.get_or_create(a, b, ts(0)).unwrap().id();
            cache.remove(&FlowKey::derive(a, b)).unwrap();
            let second = cache.get_or_create(a, b, ts(1)).unwrap().id();

            assert_ne!(first, second);
        }
    }

    #[test]
    fn test_prune_for_time() {
        let config = CacheConfig::new().with_timeout(Duration::from_secs(10));

        for mut cache in both_backends(config) {
            for n in 1..=3 {
                let (a, b) = flow(n);
                cache.get_or_create(a, b, ts(n as u64)).unwrap();
            }

            assert_eq!(cache.prune_for_time(ts(5), None), 0);
            assert_eq!(cache.prune_for_time(ts(12), None), 2);
            assert_eq!(cache.count(), 1);
            let (a3, b3) = flow(3);
            assert!(cache.lookup(a3, b3).is_some());
        }
    }

    #[test]
    fn test_prune_for_time_honours_explicit_protection() {
        let config = CacheConfig::new().with_timeout(Duration::from_secs(10));

        for mut cache in both_backends(config) {
            let (a, b) = flow(1);
            let id = cache.get_or_create(a, b, ts(0)).unwrap().id();

            assert_eq!(cache.prune_for_time(ts(100), Some(id)), 0);
            assert_eq!(cache.count(), 1);
        }
    }

    #[test]
    fn test_touch_refreshes_activity() {
        let config = CacheConfig::new().with_timeout(Duration::from_secs(10));

        for mut cache in both_backends(config) {
            let (a, b) = flow(1);
            cache.get_or_create(a, b, ts(0)).unwrap();
            let key = FlowKey::derive(a, b);

            assert!(cache.touch(&key, ts(8)));
            assert_eq!(cache.prune_for_time(ts(12), None), 0);
            assert_eq!(cache.peek(&key).map(|r| r.last_activity), Some(ts(8)));
            assert!(!cache.touch(&FlowKey::derive(flow(2).0, flow(2).1), ts(8)));
        }
    }

    #[test]
    fn test_memcap_triggers_reclaim() {
        // 512 bytes per session by default: a 2 KiB cap holds four.
        let config = CacheConfig::new()
            .with_memcap(2048)
            .with_cache_clean_sessions(2);

        for mut cache in both_backends(config) {
            for n in 1..=5 {
                let (a, b) = flow(n);
                cache.get_or_create(a, b, ts(0)).unwrap();
            }
            assert_eq!(cache.memory_used(), 2560);

            let (a, b) = flow(6);
            cache.get_or_create(a, b, ts(0)).unwrap();

            // One batch of two brings usage to 1536, then flow 6 is added.
            assert_eq!(cache.count(), 4);
            assert_eq!(cache.memory_used(), 2048);
        }
    }

    #[test]
    fn test_percent_mode_frees_target() {
        let config = CacheConfig::new()
            .with_max_sessions(10)
            .with_cache_clean_percent(0.3);

        for mut cache in both_backends(config) {
            for n in 1..=10 {
                let (a, b) = flow(n);
                cache.get_or_create(a, b, ts(0)).unwrap();
            }
            let (a, b) = flow(11);
            cache.get_or_create(a, b, ts(0)).unwrap();

            // Three sessions freed, one created.
            assert_eq!(cache.count(), 8);
            assert_eq!(cache.stats().evicted, 3);
        }
    }

    #[test]
    fn test_prune_for_memory_batch_skips_cache_marker() {
        // 600 bytes per session: the fourth creation pushes usage past the cap.
        let config = CacheConfig::new()
            .with_memcap(2048)
            .with_cache_clean_sessions(2);

        for backend in [Backend::Hash, Backend::Tree] {
            let config = config.clone().with_backend(backend);
            let mut cache = SessionCache::with_hook(config, MemoryAccounting::new(600)).unwrap();
            let mut ids = Vec::new();
            for n in 1..=4 {
                let (a, b) = flow(n);
                ids.push(cache.get_or_create(a, b, ts(0)).unwrap().id());
            }
            assert_eq!(cache.memory_used(), 2400);
            assert_eq!(cache.stats().evicted, 0);

            cache.protect(ids[0]);
            assert_eq!(cache.prune_for_memory(ts(1), None), 2);

            assert_eq!(cache.count(), 2);
            assert_eq!(cache.memory_used(), 1200);
            assert_eq!(cache.stats().evicted, 2);
            let (a, b) = flow(1);
            assert_eq!(cache.peek(&FlowKey::derive(a, b)).map(|r| r.id()), Some(ids[0]));
            let (a, b) = flow(4);
            assert!(cache.peek(&FlowKey::derive(a, b)).is_some());
        }
    }

    #[test]
    fn test_prune_for_memory_percent_honours_explicit_protection() {
        let config = CacheConfig::new()
            .with_max_sessions(10)
            .with_cache_clean_percent(0.2);

        for mut cache in both_backends(config) {
            let mut ids = Vec::new();
            for n in 1..=10 {
                let (a, b) = flow(n);
                ids.push(cache.get_or_create(a, b, ts(0)).unwrap().id());
            }
            assert_eq!(cache.protected(), None);

            // Count budget is 10 - 2; flow 1 is spared, flows 2 and 3 go.
            assert_eq!(cache.prune_for_memory(ts(1), Some(ids[0])), 2);
            assert_eq!(cache.count(), 8);
            assert_eq!(cache.stats().evicted, 2);
            for (n, present) in [(1, true), (2, false), (3, false), (4, true)] {
                let (a, b) = flow(n);
                assert_eq!(cache.peek(&FlowKey::derive(a, b)).is_some(), present, "flow {n}");
            }

            // Already within budget: nothing more to free.
            assert_eq!(cache.prune_for_memory(ts(2), Some(ids[0])), 0);
        }
    }

    #[test]
    fn test_prune_for_memory_within_limits_is_noop() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            cache.get_or_create(a, b, ts(0)).unwrap();
            assert_eq!(cache.prune_for_memory(ts(100), None), 0);
            assert_eq!(cache.count(), 1);
        }
    }

    #[test]
    fn test_tree_lookup_keeps_height_bounded() {
        let config = CacheConfig::new()
            .with_backend(Backend::Tree)
            .with_max_sessions(10_000)
            .with_memcap(u64::MAX)
            .with_max_splay_depth(64);
        let mut cache = SessionCache::new(config).unwrap();

        // Canonical keys ascend with n, so inserts alone build a spine.
        for n in 1..=5000 {
            let (a, b) = flow(n);
            cache.get_or_create(a, b, ts(0)).unwrap();
        }
        assert_eq!(cache.store.tree_height(), Some(5000));

        let (a, b) = flow(1);
        for _ in 0..1000 {
            assert!(cache.lookup(a, b).is_some());
        }
        assert!(cache.store.tree_height().is_some_and(|h| h <= 64));

        // Hits through get_or_create take the same path.
        let (a, b) = flow(5000);
        cache.get_or_create(b, a, ts(1)).unwrap();
        assert!(cache.store.tree_height().is_some_and(|h| h <= 64));
        assert_eq!(cache.count(), 5000);
    }

    #[test]
    fn test_purge() {
        for mut cache in both_backends(CacheConfig::new()) {
            for n in 1..=4 {
                let (a, b) = flow(n);
                let id = cache.get_or_create(a, b, ts(0)).unwrap().id();
                cache.protect(id);
            }

            assert_eq!(cache.purge(ts(5)), 4);
            assert!(cache.is_empty());
            assert_eq!(cache.protected(), None);
            assert_eq!(cache.memory_used(), 0);
        }
    }

    #[test]
    fn test_stats() {
        let config = CacheConfig::new().with_max_sessions(100);

        for mut cache in both_backends(config) {
            for n in 1..=5 {
                let (a, b) = flow(n);
                cache.get_or_create(a, b, ts(0)).unwrap();
            }
            let (a, b) = flow(1);
            cache.remove(&FlowKey::derive(a, b)).unwrap();

            let stats = cache.stats();
            assert_eq!(stats.count, 4);
            assert_eq!(stats.max_sessions, 100);
            assert_eq!(stats.created, 5);
            assert_eq!(stats.removed, 1);
            assert_eq!(stats.memory_used, 4 * 512);
        }
    }

    #[test]
    fn test_payload_is_mutable() {
        for mut cache in both_backends(CacheConfig::new()) {
            let (a, b) = flow(1);
            cache.get_or_create(a, b, ts(0)).unwrap().data.extend_from_slice(b"syn");

            let key = FlowKey::derive(a, b);
            cache.get_mut(&key).unwrap().data.push(b'!');
            assert_eq!(cache.peek(&key).map(|r| r.data.clone()), Some(b"syn!".to_vec()));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SessionCache::new(CacheConfig::new().with_max_sessions(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    proptest! {
        /// Property: the session count never exceeds max_sessions.
        #[test]
        fn count_never_exceeds_max_sessions(
            max in 2usize..16,
            batch in 1usize..4,
            tree in any::<bool>(),
            flows in prop::collection::vec((0u32..40, 0u64..200), 1..120),
        ) {
            let backend = if tree { Backend::Tree } else { Backend::Hash };
            let config = CacheConfig::new()
                .with_backend(backend)
                .with_max_sessions(max)
                .with_cache_clean_sessions(batch)
                .with_memcap(u64::MAX);
            let mut cache = SessionCache::new(config).unwrap();

            for (n, t) in flows {
                let (a, b) = flow(n);
                prop_assert!(cache.get_or_create(a, b, ts(t)).is_ok());
                prop_assert!(cache.count() <= max);
            }
        }

        /// Property: the protected session survives any creation sequence.
        #[test]
        fn protected_session_is_never_evicted(
            tree in any::<bool>(),
            percent in prop::sample::select(vec![0.0f32, 0.25, 0.5]),
            flows in prop::collection::vec(1u32..50, 1..80),
        ) {
            let backend = if tree { Backend::Tree } else { Backend::Hash };
            let config = CacheConfig::new()
                .with_backend(backend)
                .with_max_sessions(4)
                .with_cache_clean_sessions(2)
                .with_cache_clean_percent(percent);
            let mut cache = SessionCache::new(config).unwrap();

            let (pa, pb) = flow(0);
            let id = cache.get_or_create(pa, pb, ts(0)).unwrap().id();
            cache.protect(id);

            for (i, n) in flows.into_iter().enumerate() {
                let (a, b) = flow(n);
                let _ = cache.get_or_create(a, b, ts(1000 + i as u64));
                prop_assert_eq!(cache.peek(&FlowKey::derive(pa, pb)).map(|r| r.id()), Some(id));
            }
        }
    }
}
