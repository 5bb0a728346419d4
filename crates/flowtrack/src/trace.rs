//! Packet trace parsing.
//!
//! One packet per line, whitespace separated:
//!
//! ```text
//! <ts> <src_ip>:<port> <dst_ip>:<port> [FIN|RST]
//! ```
//!
//! `ts` is in seconds; a fractional part is accepted and truncated. Blank
//! lines and lines starting with `#` are skipped.

use std::net::SocketAddrV4;

use anyhow::{Context, Result, bail};
use flowtrack_session::{Endpoint, Timestamp};

/// Connection teardown carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Fin,
    Rst,
}

/// One packet from a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub ts: Timestamp,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub teardown: Option<Teardown>,
}

impl Packet {
    /// Parse a trace line. Returns `None` for blank and comment lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut fields = line.split_whitespace();
        let (Some(ts), Some(src), Some(dst)) = (fields.next(), fields.next(), fields.next())
        else {
            bail!("expected '<ts> <src_ip>:<port> <dst_ip>:<port> [FIN|RST]'");
        };

        let teardown = match fields.next() {
            None => None,
            Some(flag) if flag.eq_ignore_ascii_case("fin") => Some(Teardown::Fin),
            Some(flag) if flag.eq_ignore_ascii_case("rst") => Some(Teardown::Rst),
            Some(flag) => bail!("unknown flag '{flag}'"),
        };
        if let Some(extra) = fields.next() {
            bail!("unexpected trailing field '{extra}'");
        }

        Ok(Some(Self {
            ts: parse_timestamp(ts)?,
            src: parse_endpoint(src)?,
            dst: parse_endpoint(dst)?,
            teardown,
        }))
    }
}

fn parse_timestamp(field: &str) -> Result<Timestamp> {
    let secs = field.split_once('.').map_or(field, |(whole, _)| whole);
    let secs: u64 = secs
        .parse()
        .with_context(|| format!("invalid timestamp '{field}'"))?;
    Ok(Timestamp::from_secs(secs))
}

fn parse_endpoint(field: &str) -> Result<Endpoint> {
    let addr: SocketAddrV4 = field
        .parse()
        .with_context(|| format!("invalid endpoint '{field}'"))?;
    Ok(Endpoint::from((*addr.ip(), addr.port())))
}
