//! Eviction policies over a [`SessionStore`].
//!
//! Every policy walks the store from the least recently used end, skips the
//! protected session, and notifies the hook before each record is removed.
//! Each returns the number of sessions evicted.

use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::hook::SessionHook;
use crate::key::FlowKey;
use crate::record::SessionId;
use crate::store::SessionStore;
use crate::time::Timestamp;

/// Evict sessions idle for at least `timeout`, oldest first.
///
/// Stops at the first session that is still active or when only the
/// protected session remains.
pub fn sweep_idle<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    now: Timestamp,
    protected: Option<SessionId>,
    timeout: Duration,
) -> usize {
    let mut evicted = 0;

    while let Some(victim) = store.lru_victim(protected) {
        if !now.is_idle(victim.last_activity, timeout) {
            trace!(
                flow = %victim.flow_key(),
                last_activity = %victim.last_activity,
                "Oldest session still active, idle sweep done"
            );
            break;
        }

        let key = *victim.flow_key();
        if let Err(e) = evict_one(store, hook, &key, now, protected) {
            warn!(flow = %key, error = %e, "Idle sweep stopped");
            break;
        }
        evicted += 1;
    }

    if evicted > 0 {
        debug!(evicted, remaining = store.len(), now = %now, "Pruned idle sessions");
    }
    evicted
}

/// Run the capacity reclaim selected by `config`.
pub fn reclaim<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    now: Timestamp,
    protected: Option<SessionId>,
    config: &CacheConfig,
) -> usize {
    if config.uses_percent_reclaim() {
        reclaim_percent(store, hook, now, protected, config)
    } else {
        reclaim_batch(store, hook, now, protected, config)
    }
}

/// Evict `cache_clean_sessions` at a time until memory is under the memcap
/// and there is room for a batch of new sessions.
///
/// Always leaves at least one session resident.
pub fn reclaim_batch<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    now: Timestamp,
    protected: Option<SessionId>,
    config: &CacheConfig,
) -> usize {
    let batch_size = config.cache_clean_sessions.max(1);
    let count_ceiling = config.max_sessions.saturating_sub(batch_size);
    let mut evicted = 0;

    'passes: while (hook.memory_used() > config.memcap || store.len() > count_ceiling)
        && store.len() > 1
    {
        let mut batch = 0;
        while batch < batch_size && store.len() > 1 {
            let Some(victim) = store.lru_victim(protected) else {
                break 'passes;
            };
            let key = *victim.flow_key();
            if let Err(e) = evict_one(store, hook, &key, now, protected) {
                warn!(flow = %key, error = %e, "Batch reclaim stopped");
                break 'passes;
            }
            batch += 1;
        }
        evicted += batch;
    }

    if evicted > 0 {
        debug!(
            evicted,
            remaining = store.len(),
            memory_used = hook.memory_used(),
            "Reclaimed sessions in batches"
        );
    }
    evicted
}

/// Evict until memory is `max_sessions * cache_clean_percent` below the
/// memcap and the same number of sessions below `max_sessions`.
///
/// Always leaves at least one session resident.
pub fn reclaim_percent<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    now: Timestamp,
    protected: Option<SessionId>,
    config: &CacheConfig,
) -> usize {
    let target = config.percent_target();
    let memory_floor = config.memcap.saturating_sub(target);
    let count_ceiling = config
        .max_sessions
        .saturating_sub(usize::try_from(target).unwrap_or(usize::MAX).max(1));
    let mut evicted = 0;

    while (hook.memory_used() > memory_floor || store.len() > count_ceiling)
        && store.len() > 1
    {
        let Some(victim) = store.lru_victim(protected) else {
            break;
        };
        let key = *victim.flow_key();
        if let Err(e) = evict_one(store, hook, &key, now, protected) {
            warn!(flow = %key, error = %e, "Percentage reclaim stopped");
            break;
        }
        evicted += 1;
    }

    if evicted > 0 {
        debug!(
            evicted,
            target,
            remaining = store.len(),
            memory_used = hook.memory_used(),
            "Reclaimed sessions by percentage"
        );
    }
    evicted
}

/// Evict every session, most recently used first.
pub fn purge<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    now: Timestamp,
) -> usize {
    let mut evicted = 0;
    while let Some(record) = store.most_recent() {
        let key = *record.flow_key();
        if let Err(e) = evict_one(store, hook, &key, now, None) {
            warn!(flow = %key, error = %e, "Purge stopped");
            break;
        }
        evicted += 1;
    }
    evicted
}

/// Notify the hook and remove one session.
///
/// A hook failure is logged and the session is removed anyway.
fn evict_one<H: SessionHook>(
    store: &mut dyn SessionStore<H::Payload>,
    hook: &mut H,
    key: &FlowKey,
    now: Timestamp,
    protected: Option<SessionId>,
) -> Result<()> {
    let record = store.find(key).ok_or(Error::NotFound(*key))?;
    if Some(record.id()) == protected {
        return Err(Error::InvariantViolation(format!(
            "refusing to evict protected session {} ({key})",
            record.id()
        )));
    }

    if let Err(e) = hook.on_evict(record, now) {
        warn!(flow = %key, session = %record.id(), error = %e, "Session hook failed during eviction");
    }
    trace!(flow = %key, session = %record.id(), "Evicting session");
    store.remove(key);
    Ok(())
}
