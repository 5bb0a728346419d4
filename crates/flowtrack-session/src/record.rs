//! Per-flow session records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::{Endpoint, FlowKey};
use crate::time::Timestamp;

/// Identity of a session record.
///
/// Ids are allocated from a per-cache counter and never reused, so a flow
/// that is torn down and seen again gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State kept for one bidirectional flow.
///
/// `D` is the preprocessor's own per-flow state; the cache stores it but never
/// looks inside.
#[derive(Debug, Clone)]
pub struct SessionRecord<D> {
    id: SessionId,
    flow_key: FlowKey,

    /// Endpoint that sent the packet which created the session.
    pub client: Endpoint,

    /// The other endpoint.
    pub server: Endpoint,

    /// Capture time of the packet that created the session.
    pub created_at: Timestamp,

    /// Capture time of the most recent packet seen on the flow.
    pub last_activity: Timestamp,

    /// Opaque preprocessor state.
    pub data: D,
}

impl<D> SessionRecord<D> {
    /// Create a record for a flow first seen from `client` to `server`.
    pub fn new(id: SessionId, client: Endpoint, server: Endpoint, now: Timestamp, data: D) -> Self {
        Self {
            id,
            flow_key: FlowKey::derive(client, server),
            client,
            server,
            created_at: now,
            last_activity: now,
            data,
        }
    }

    /// The record's identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Canonical key of the flow.
    pub fn flow_key(&self) -> &FlowKey {
        &self.flow_key
    }

    /// Record activity on the flow.
    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}
