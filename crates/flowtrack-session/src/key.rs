//! Direction-independent flow keys.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// One side of a TCP conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// IPv4 address as a host-order integer.
    pub ip: u32,

    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from a numeric address and port.
    pub fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }

    /// The address as an [`Ipv4Addr`].
    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

impl From<(Ipv4Addr, u16)> for Endpoint {
    fn from((addr, port): (Ipv4Addr, u16)) -> Self {
        Self::new(u32::from(addr), port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr(), self.port)
    }
}

/// Canonical identifier for a bidirectional flow.
///
/// The endpoint with the numerically smaller address always occupies the
/// `low_*` fields; when both addresses are equal the smaller port does. Both
/// directions of a conversation therefore produce the same key.
///
/// The derived ordering compares `low_ip`, `high_ip`, `low_port`, `high_port`
/// in that order, which is the ordering used by the tree store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    low_ip: u32,
    high_ip: u32,
    low_port: u16,
    high_port: u16,
}

impl FlowKey {
    /// Derive the canonical key for a pair of endpoints.
    ///
    /// `derive(a, b) == derive(b, a)` for every input.
    pub fn derive(a: Endpoint, b: Endpoint) -> Self {
        let (low, high) = if (a.ip, a.port) <= (b.ip, b.port) {
            (a, b)
        } else {
            (b, a)
        };

        Self {
            low_ip: low.ip,
            high_ip: high.ip,
            low_port: low.port,
            high_port: high.port,
        }
    }

    /// Derive a key from raw packet fields.
    pub fn from_packet(src_ip: u32, src_port: u16, dst_ip: u32, dst_port: u16) -> Self {
        Self::derive(Endpoint::new(src_ip, src_port), Endpoint::new(dst_ip, dst_port))
    }

    /// The endpoint with the smaller address (or port, on equal addresses).
    pub fn low(&self) -> Endpoint {
        Endpoint::new(self.low_ip, self.low_port)
    }

    /// The other endpoint.
    pub fn high(&self) -> Endpoint {
        Endpoint::new(self.high_ip, self.high_port)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low(), self.high())
    }
}
