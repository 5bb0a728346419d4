//! Replay command - drives the session cache from a packet trace.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use flowtrack_session::{
    CacheStats, Error as SessionError, FlowKey, MemoryAccounting, SessionCache, Timestamp,
};
use serde::Serialize;
use tracing::{debug, info};

use super::Context;
use crate::trace::Packet;

/// Arguments for the replay command.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Trace file: one `<ts> <src_ip>:<port> <dst_ip>:<port> [FIN|RST]` per line
    pub trace: PathBuf,

    /// Seconds between idle sweeps (default: the session timeout, 0 disables)
    #[arg(long)]
    pub prune_interval: Option<u64>,
}

/// Replay results for JSON output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    /// Packets read from the trace.
    pub packets: u64,
    /// Packets whose session could not be created.
    pub dropped: u64,
    /// Idle sweeps run on the prune interval.
    pub sweeps: u64,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    #[serde(flatten)]
    summary: ReplaySummary,
    #[serde(flatten)]
    stats: CacheStats,
}

/// Feeds packets through a session cache.
pub struct Replayer {
    cache: SessionCache<MemoryAccounting>,
    prune_interval: u64,
    last_prune: Option<Timestamp>,
    summary: ReplaySummary,
}

impl Replayer {
    pub fn new(cache: SessionCache<MemoryAccounting>, prune_interval: u64) -> Self {
        Self {
            cache,
            prune_interval,
            last_prune: None,
            summary: ReplaySummary::default(),
        }
    }

    /// Process one packet.
    ///
    /// The packet's session is protected while it is handled, so the sweep
    /// run on its behalf cannot evict it.
    pub fn process(&mut self, packet: &Packet) -> Result<()> {
        self.summary.packets += 1;

        let id = match self.cache.get_or_create(packet.src, packet.dst, packet.ts) {
            Ok(record) => record.id(),
            Err(SessionError::Full) => {
                self.summary.dropped += 1;
                debug!(src = %packet.src, dst = %packet.dst, "Dropped packet, no session available");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let key = FlowKey::derive(packet.src, packet.dst);
        self.cache.protect(id);
        self.cache.touch(&key, packet.ts);

        if self.prune_due(packet.ts) {
            self.cache.prune_for_time(packet.ts, Some(id));
            self.last_prune = Some(packet.ts);
            self.summary.sweeps += 1;
        }
        self.cache.release();

        if let Some(teardown) = packet.teardown {
            debug!(flow = %key, ?teardown, "Session closed");
            self.cache.remove(&key)?;
        }

        Ok(())
    }

    fn prune_due(&self, now: Timestamp) -> bool {
        if self.prune_interval == 0 {
            return false;
        }
        self.last_prune
            .is_some_and(|last| now.saturating_since(last).as_secs() >= self.prune_interval)
    }

    /// Mark the first packet time so the first sweep runs one interval later.
    fn start_clock(&mut self, now: Timestamp) {
        if self.last_prune.is_none() {
            self.last_prune = Some(now);
        }
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    pub fn cache(&self) -> &SessionCache<MemoryAccounting> {
        &self.cache
    }

    /// Tear down every remaining session.
    pub fn finish(&mut self, now: Timestamp) -> usize {
        self.cache.log_summary();
        self.cache.purge(now)
    }
}

/// Run the replay command.
pub fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let section = ctx.config.config.session();
    let cache_config = section.to_cache_config()?;
    let prune_interval = args
        .prune_interval
        .unwrap_or_else(|| cache_config.timeout.as_secs());
    let cache = SessionCache::with_hook(cache_config, section.memory_accounting())?;
    let mut replayer = Replayer::new(cache, prune_interval);

    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open trace '{}'", args.trace.display()))?;

    info!(
        trace = %args.trace.display(),
        backend = %replayer.cache().backend(),
        prune_interval,
        "Replaying trace"
    );

    let mut last_ts = Timestamp::ZERO;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read '{}'", args.trace.display()))?;
        let packet = Packet::parse(&line)
            .with_context(|| format!("{}: line {}", args.trace.display(), idx + 1))?;
        let Some(packet) = packet else {
            continue;
        };

        replayer.start_clock(packet.ts);
        replayer.process(&packet)?;
        last_ts = last_ts.max(packet.ts);
    }

    let output = ReplayOutput {
        summary: replayer.summary().clone(),
        stats: replayer.cache().stats(),
    };
    let purged = replayer.finish(last_ts);
    debug!(purged, "Replay finished");

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&output, ctx);
    }

    Ok(())
}

fn print_summary(output: &ReplayOutput, ctx: &Context) {
    let dim = Style::new().dim();
    let red = Style::new().red();

    println!();
    println!("{}", style("Replay Summary").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Packets:  "), output.summary.packets);
    let dropped = if output.summary.dropped > 0 {
        red.apply_to(output.summary.dropped.to_string())
    } else {
        Style::new().apply_to(output.summary.dropped.to_string())
    };
    println!("  {} {}", dim.apply_to("Dropped:  "), dropped);
    println!("  {} {}", dim.apply_to("Created:  "), output.stats.created);
    println!("  {} {}", dim.apply_to("Removed:  "), output.stats.removed);
    println!("  {} {}", dim.apply_to("Evicted:  "), output.stats.evicted);
    println!(
        "  {} {} / {}",
        dim.apply_to("Active:   "),
        output.stats.count,
        output.stats.max_sessions
    );
    println!(
        "  {} {} / {} bytes",
        dim.apply_to("Memory:   "),
        output.stats.memory_used,
        output.stats.memcap
    );

    if ctx.verbose {
        println!("  {} {}", dim.apply_to("Backend:  "), output.stats.backend);
        println!("  {} {}", dim.apply_to("Sweeps:   "), output.summary.sweeps);
    }
    println!();
}
