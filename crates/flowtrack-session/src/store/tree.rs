//! Splay-tree store with an auxiliary recency list.
//!
//! Nodes live in an index arena. Tree links and recency links are kept in a
//! separate `Copy` table so structural updates never touch the records
//! themselves. Splaying is top-down and iterative; a descent deeper than the
//! configured limit triggers a full rebuild into a balanced tree.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::Backend;
use crate::error::{Error, Result};
use crate::key::{Endpoint, FlowKey};
use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

type Idx = usize;

#[derive(Debug, Clone, Copy)]
struct Links {
    key: FlowKey,
    left: Option<Idx>,
    right: Option<Idx>,
    /// Towards the most recently used end.
    newer: Option<Idx>,
    /// Towards the least recently used end.
    older: Option<Idx>,
}

impl Links {
    fn new(key: FlowKey) -> Self {
        Self {
            key,
            left: None,
            right: None,
            newer: None,
            older: None,
        }
    }
}

/// Ordered session store without a fixed capacity.
pub struct TreeStore<D> {
    links: Vec<Links>,
    records: Vec<Option<SessionRecord<D>>>,
    free: Vec<Idx>,
    root: Option<Idx>,
    /// Most recently used.
    head: Option<Idx>,
    /// Least recently used.
    tail: Option<Idx>,
    len: usize,
    max_depth: usize,
    pending_rebuild: bool,
    rebuilds: u64,
}

impl<D> TreeStore<D> {
    /// Create an empty tree that rebuilds after descents deeper than
    /// `max_depth`.
    pub fn new(max_depth: usize) -> Self {
        Self {
            links: Vec::new(),
            records: Vec::new(),
            free: Vec::new(),
            root: None,
            head: None,
            tail: None,
            len: 0,
            max_depth: max_depth.max(2),
            pending_rebuild: false,
            rebuilds: 0,
        }
    }

    /// Number of forced rebalances performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Descent depth past which a splay schedules a rebuild.
    pub fn depth_limit(&self) -> usize {
        let balanced = (usize::BITS - self.len.leading_zeros()) as usize;
        self.max_depth.max(2 * balanced)
    }

    /// Height of the tree (zero when empty).
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack: Vec<(Idx, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((idx, depth)) = stack.pop() {
            height = height.max(depth);
            let links = &self.links[idx];
            stack.extend(links.left.map(|l| (l, depth + 1)));
            stack.extend(links.right.map(|r| (r, depth + 1)));
        }
        height
    }

    /// Splaying lookup by canonical key.
    ///
    /// Moves the matching node (or the last node on the search path) to the
    /// root, so repeated lookups of hot flows stay cheap.
    pub fn find_ordered(&mut self, key: &FlowKey) -> Option<&SessionRecord<D>> {
        let idx = self.splay_root(key)?;
        self.records[idx].as_ref()
    }

    /// Look up a flow from raw endpoints, trying `(a, b)` then `(b, a)`.
    pub fn find_endpoints(&self, a: Endpoint, b: Endpoint) -> Option<&SessionRecord<D>> {
        self.find(&FlowKey::derive(a, b))
            .or_else(|| self.find(&FlowKey::derive(b, a)))
    }

    /// The record with the smallest key.
    ///
    /// This is ordinal order, not recency; use
    /// [`SessionStore::least_recent`] for eviction.
    pub fn first(&self) -> Option<&SessionRecord<D>> {
        let mut idx = self.root?;
        while let Some(left) = self.links[idx].left {
            idx = left;
        }
        self.records[idx].as_ref()
    }

    /// Records in key order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &SessionRecord<D>> {
        self.in_order()
            .into_iter()
            .filter_map(move |idx| self.records[idx].as_ref())
    }

    fn locate(&self, key: &FlowKey) -> Option<Idx> {
        let mut cursor = self.root;
        while let Some(idx) = cursor {
            cursor = match key.cmp(&self.links[idx].key) {
                Ordering::Less => self.links[idx].left,
                Ordering::Greater => self.links[idx].right,
                Ordering::Equal => return Some(idx),
            };
        }
        None
    }

    /// Top-down splay of `key` in the subtree rooted at `root`.
    ///
    /// Returns the new subtree root: the node holding `key` if present,
    /// otherwise the last node visited.
    fn splay(&mut self, root: Idx, key: &FlowKey) -> Idx {
        let mut t = root;
        // Left tree collects nodes smaller than key, right tree larger ones.
        let mut left_root: Option<Idx> = None;
        let mut left_max: Option<Idx> = None;
        let mut right_root: Option<Idx> = None;
        let mut right_min: Option<Idx> = None;
        let mut depth = 0usize;

        loop {
            match key.cmp(&self.links[t].key) {
                Ordering::Less => {
                    let Some(mut child) = self.links[t].left else {
                        break;
                    };
                    if *key < self.links[child].key {
                        // Rotate right.
                        self.links[t].left = self.links[child].right;
                        self.links[child].right = Some(t);
                        t = child;
                        depth += 1;
                        match self.links[t].left {
                            Some(next) => child = next,
                            None => break,
                        }
                    }
                    // Link t into the right tree.
                    match right_min {
                        Some(min) => self.links[min].left = Some(t),
                        None => right_root = Some(t),
                    }
                    right_min = Some(t);
                    t = child;
                }
                Ordering::Greater => {
                    let Some(mut child) = self.links[t].right else {
                        break;
                    };
                    if *key > self.links[child].key {
                        // Rotate left.
                        self.links[t].right = self.links[child].left;
                        self.links[child].left = Some(t);
                        t = child;
                        depth += 1;
                        match self.links[t].right {
                            Some(next) => child = next,
                            None => break,
                        }
                    }
                    // Link t into the left tree.
                    match left_max {
                        Some(max) => self.links[max].right = Some(t),
                        None => left_root = Some(t),
                    }
                    left_max = Some(t);
                    t = child;
                }
                Ordering::Equal => break,
            }
            depth += 1;
        }

        let t_left = self.links[t].left;
        let t_right = self.links[t].right;
        let new_left = match left_max {
            Some(max) => {
                self.links[max].right = t_left;
                left_root
            }
            None => t_left,
        };
        let new_right = match right_min {
            Some(min) => {
                self.links[min].left = t_right;
                right_root
            }
            None => t_right,
        };
        self.links[t].left = new_left;
        self.links[t].right = new_right;

        if depth > self.depth_limit() {
            self.pending_rebuild = true;
        }
        t
    }
}

impl<D> TreeStore<D> {
    /// Splay `key` to the root and return its index if present.
    fn splay_root(&mut self, key: &FlowKey) -> Option<Idx> {
        let root = self.splay(self.root?, key);
        self.root = Some(root);
        self.settle();
        (self.links[root].key == *key).then_some(root)
    }

    /// Run a rebuild requested by a deep splay.
    fn settle(&mut self) {
        if self.pending_rebuild {
            self.pending_rebuild = false;
            self.rebuild();
        }
    }

    /// Relink every node into a perfectly balanced tree.
    fn rebuild(&mut self) {
        let order = self.in_order();
        let mut root = None;
        // (lo, hi, parent, attach as left child)
        let mut work: Vec<(usize, usize, Option<(Idx, bool)>)> = vec![(0, order.len(), None)];

        while let Some((lo, hi, parent)) = work.pop() {
            let node = if lo < hi {
                let mid = lo + (hi - lo) / 2;
                let idx = order[mid];
                work.push((lo, mid, Some((idx, true))));
                work.push((mid + 1, hi, Some((idx, false))));
                Some(idx)
            } else {
                None
            };

            match parent {
                None => root = node,
                Some((p, true)) => self.links[p].left = node,
                Some((p, false)) => self.links[p].right = node,
            }
        }

        self.root = root;
        self.rebuilds += 1;
        debug!(
            sessions = self.len,
            height = self.height(),
            rebuilds = self.rebuilds,
            "Splay tree exceeded depth limit, rebalanced"
        );
    }

    fn in_order(&self) -> Vec<Idx> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut cursor = self.root;

        loop {
            while let Some(idx) = cursor {
                stack.push(idx);
                cursor = self.links[idx].left;
            }
            let Some(idx) = stack.pop() else {
                break;
            };
            out.push(idx);
            cursor = self.links[idx].right;
        }
        out
    }

    fn alloc(&mut self, record: SessionRecord<D>) -> Idx {
        let links = Links::new(*record.flow_key());
        match self.free.pop() {
            Some(idx) => {
                self.links[idx] = links;
                self.records[idx] = Some(record);
                idx
            }
            None => {
                self.links.push(links);
                self.records.push(Some(record));
                self.links.len() - 1
            }
        }
    }

    fn push_front(&mut self, idx: Idx) {
        self.links[idx].newer = None;
        self.links[idx].older = self.head;
        match self.head {
            Some(head) => self.links[head].newer = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: Idx) {
        let Links { newer, older, .. } = self.links[idx];
        match newer {
            Some(n) => self.links[n].older = older,
            None => self.head = older,
        }
        match older {
            Some(o) => self.links[o].newer = newer,
            None => self.tail = newer,
        }
        self.links[idx].newer = None;
        self.links[idx].older = None;
    }
}

impl<D> Default for TreeStore<D> {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_SPLAY_DEPTH)
    }
}

impl<D> SessionStore<D> for TreeStore<D> {
    fn backend(&self) -> Backend {
        Backend::Tree
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_full(&self) -> bool {
        false
    }

    fn find(&self, key: &FlowKey) -> Option<&SessionRecord<D>> {
        self.locate(key).and_then(|idx| self.records[idx].as_ref())
    }

    fn find_mut(&mut self, key: &FlowKey) -> Option<&mut SessionRecord<D>> {
        let idx = self.splay_root(key)?;
        self.records[idx].as_mut()
    }

    fn contains(&self, key: &FlowKey) -> bool {
        self.locate(key).is_some()
    }

    fn touch(&mut self, key: &FlowKey) -> bool {
        let Some(idx) = self.splay_root(key) else {
            return false;
        };
        self.unlink(idx);
        self.push_front(idx);
        true
    }

    fn insert(&mut self, record: SessionRecord<D>) -> Result<&mut SessionRecord<D>> {
        let key = *record.flow_key();

        let idx = match self.root {
            None => self.alloc(record),
            Some(root) => {
                let root = self.splay(root, &key);
                self.root = Some(root);

                match key.cmp(&self.links[root].key) {
                    Ordering::Equal => {
                        self.settle();
                        return Err(Error::InvariantViolation(format!(
                            "session already present for {key}"
                        )));
                    }
                    Ordering::Less => {
                        let idx = self.alloc(record);
                        self.links[idx].left = self.links[root].left;
                        self.links[idx].right = Some(root);
                        self.links[root].left = None;
                        idx
                    }
                    Ordering::Greater => {
                        let idx = self.alloc(record);
                        self.links[idx].right = self.links[root].right;
                        self.links[idx].left = Some(root);
                        self.links[root].right = None;
                        idx
                    }
                }
            }
        };

        self.root = Some(idx);
        self.push_front(idx);
        self.len += 1;
        self.settle();

        self.records[idx].as_mut().ok_or(Error::NotFound(key))
    }

    fn remove(&mut self, key: &FlowKey) -> Option<SessionRecord<D>> {
        let root = self.splay(self.root?, key);
        self.root = Some(root);
        if self.links[root].key != *key {
            self.settle();
            return None;
        }

        let Links { left, right, .. } = self.links[root];
        self.root = match left {
            None => right,
            Some(left) => {
                // Every key in the left subtree is smaller, so this brings
                // its maximum up with an empty right child.
                let joined = self.splay(left, key);
                self.links[joined].right = right;
                Some(joined)
            }
        };

        self.unlink(root);
        self.links[root].left = None;
        self.links[root].right = None;
        self.free.push(root);
        self.len -= 1;
        let record = self.records[root].take();
        self.settle();
        record
    }

    fn least_recent(&self) -> Option<&SessionRecord<D>> {
        self.tail.and_then(|idx| self.records[idx].as_ref())
    }

    fn most_recent(&self) -> Option<&SessionRecord<D>> {
        self.head.and_then(|idx| self.records[idx].as_ref())
    }

    fn tree_height(&self) -> Option<usize> {
        Some(self.height())
    }

    fn lru_victim(&self, protected: Option<SessionId>) -> Option<&SessionRecord<D>> {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            if let Some(record) = self.records[idx].as_ref()
                && Some(record.id()) != protected
            {
                return Some(record);
            }
            cursor = self.links[idx].newer;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    const SERVER: Endpoint = Endpoint {
        ip: 0xffff_fff0,
        port: 80,
    };

    fn record(id: u64) -> SessionRecord<()> {
        SessionRecord::new(
            SessionId::new(id),
            Endpoint::new(id as u32, 1000),
            SERVER,
            Timestamp::from_secs(id),
            (),
        )
    }

    fn key(id: u64) -> FlowKey {
        *record(id).flow_key()
    }

    fn ids_in_order(store: &TreeStore<()>) -> Vec<u64> {
        store.iter_ordered().map(|r| r.id().as_u64()).collect()
    }

    #[test]
    fn test_ordered_iteration() {
        let mut store = TreeStore::new(64);
        for id in [5, 1, 9, 3, 7, 2, 8] {
            store.insert(record(id)).unwrap();
        }
        assert_eq!(ids_in_order(&store), vec![1, 2, 3, 5, 7, 8, 9]);
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_first_is_ordinal_not_recency() {
        let mut store = TreeStore::new(64);
        store.insert(record(7)).unwrap();
        store.insert(record(3)).unwrap();
        store.insert(record(9)).unwrap();

        assert_eq!(store.first().map(|r| r.id().as_u64()), Some(3));
        assert_eq!(store.least_recent().map(|r| r.id().as_u64()), Some(7));
    }

    #[test]
    fn test_find_ordered_splays_to_root() {
        let mut store = TreeStore::new(64);
        for id in 1..=10 {
            store.insert(record(id)).unwrap();
        }

        assert_eq!(store.find_ordered(&key(4)).map(|r| r.id().as_u64()), Some(4));
        assert_eq!(store.root.map(|idx| store.links[idx].key), Some(key(4)));
        assert!(store.find_ordered(&key(42)).is_none());
        assert_eq!(ids_in_order(&store), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_find_endpoints_either_direction() {
        let mut store = TreeStore::new(64);
        store.insert(record(4)).unwrap();
        let client = Endpoint::new(4, 1000);

        assert!(store.find_endpoints(client, SERVER).is_some());
        assert!(store.find_endpoints(SERVER, client).is_some());
        assert!(store.find_endpoints(Endpoint::new(5, 1000), SERVER).is_none());
    }

    #[test]
    fn test_remove_keeps_order_and_recency() {
        let mut store = TreeStore::new(64);
        for id in 1..=20 {
            store.insert(record(id)).unwrap();
        }

        for id in [1, 20, 10, 11, 5] {
            assert_eq!(store.remove(&key(id)).map(|r| r.id().as_u64()), Some(id));
        }
        assert!(store.remove(&key(10)).is_none());

        let expected: Vec<u64> = (1..=20)
            .filter(|id| ![1, 20, 10, 11, 5].contains(id))
            .collect();
        assert_eq!(ids_in_order(&store), expected);
        assert_eq!(store.len(), 15);
        assert_eq!(store.least_recent().map(|r| r.id().as_u64()), Some(2));
        assert_eq!(store.most_recent().map(|r| r.id().as_u64()), Some(19));
    }

    #[test]
    fn test_slots_are_reused() {
        let mut store = TreeStore::new(64);
        store.insert(record(1)).unwrap();
        store.insert(record(2)).unwrap();
        store.remove(&key(1));
        store.insert(record(3)).unwrap();

        assert_eq!(store.links.len(), 2);
        assert_eq!(ids_in_order(&store), vec![2, 3]);
    }

    #[test]
    fn test_sequential_inserts_force_rebuild() {
        let mut store = TreeStore::new(8);
        for id in 1..=200 {
            store.insert(record(id)).unwrap();
        }
        // Ascending inserts leave a single left spine.
        assert_eq!(store.height(), 200);

        assert!(store.find_ordered(&key(1)).is_some());
        assert!(store.rebuilds() >= 1);
        assert!(store.height() <= 8);
        assert_eq!(ids_in_order(&store), (1..=200).collect::<Vec<_>>());
    }

    #[test]
    fn test_touch_rebalances_deep_spine() {
        let mut store = TreeStore::new(64);
        for id in 1..=5000 {
            store.insert(record(id)).unwrap();
        }
        assert_eq!(store.height(), 5000);

        for _ in 0..1000 {
            assert!(SessionStore::touch(&mut store, &key(1)));
            assert!(store.find(&key(1)).is_some());
        }
        assert!(store.rebuilds() >= 1);
        assert!(store.height() <= store.depth_limit());
        assert_eq!(store.most_recent().map(|r| r.id().as_u64()), Some(1));
        assert_eq!(store.least_recent().map(|r| r.id().as_u64()), Some(2));
    }

    #[test]
    fn test_touch_missing_key_still_splays() {
        let mut store = TreeStore::new(8);
        for id in 1..=200 {
            store.insert(record(id)).unwrap();
        }
        assert!(!SessionStore::touch(&mut store, &key(0)));
        assert!(store.height() <= store.depth_limit());
        assert_eq!(store.least_recent().map(|r| r.id().as_u64()), Some(1));
    }

    #[test]
    fn test_shallow_tree_does_not_rebuild() {
        let mut store = TreeStore::new(64);
        for id in [4, 2, 6, 1, 3, 5, 7] {
            store.insert(record(id)).unwrap();
        }
        for id in 1..=7 {
            store.find_ordered(&key(id));
        }
        assert_eq!(store.rebuilds(), 0);
    }

    #[test]
    fn test_find_mut_allows_payload_update() {
        let mut store: TreeStore<u8> = TreeStore::new(64);
        let r = SessionRecord::new(SessionId::new(1), Endpoint::new(1, 1), SERVER, Timestamp::ZERO, 0u8);
        let k = *r.flow_key();
        store.insert(r).unwrap();

        if let Some(r) = store.find_mut(&k) {
            r.data = 9;
        }
        assert_eq!(store.find(&k).map(|r| r.data), Some(9));
    }
}
