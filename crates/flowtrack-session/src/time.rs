//! Packet timestamps and idle-time arithmetic.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Packet capture time in whole seconds.
///
/// The cache never reads a clock; every timestamp comes from the caller,
/// normally the capture header of the packet being processed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Seconds since the capture epoch.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_secs(self.0.saturating_sub(earlier.0))
    }

    /// Whether a session last active at `last_activity` has been idle for at
    /// least `timeout` as of `self`.
    pub fn is_idle(&self, last_activity: Timestamp, timeout: Duration) -> bool {
        self.saturating_since(last_activity) >= timeout
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_since() {
        let t = Timestamp::from_secs(10);
        assert_eq!(t.saturating_since(Timestamp::from_secs(4)), Duration::from_secs(6));
        assert_eq!(t.saturating_since(Timestamp::from_secs(20)), Duration::ZERO);
    }

    #[test]
    fn test_idle_boundary_is_inclusive() {
        let timeout = Duration::from_secs(30);
        let now = Timestamp::from_secs(100);

        assert!(now.is_idle(Timestamp::from_secs(70), timeout));
        assert!(!now.is_idle(Timestamp::from_secs(71), timeout));
    }

    #[test]
    fn test_future_activity_is_not_idle() {
        let now = Timestamp::from_secs(5);
        assert!(!now.is_idle(Timestamp::from_secs(50), Duration::from_secs(1)));
    }
}
