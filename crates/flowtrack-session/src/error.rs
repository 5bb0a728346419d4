//! Error types for session cache operations.

use crate::key::FlowKey;

/// Error type for session cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store is at capacity and no eligible victim could be evicted.
    #[error("Session store full: no evictable sessions")]
    Full,

    /// No session exists for the flow.
    #[error("Session not found: {0}")]
    NotFound(FlowKey),

    /// An operation would have destroyed the protected session.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Error reported by a session hook.
    #[error("Session hook error: {0}")]
    Hook(String),

    /// The cache configuration cannot be used.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, Error>;
