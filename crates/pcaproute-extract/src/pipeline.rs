//! Extraction pipeline: hosts → liveness → route blocks → DNS names.
//!
//! All mutable state for one run lives in a [`RunContext`] that is created
//! when the run starts and consumed into a [`RunOutcome`] when it ends.
//! Capture passes are strictly sequential: at most one tcpdump process is
//! alive at any time, so wall-clock time grows linearly with the number of
//! distinct hosts.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use pcaproute_core::{CaptureFilter, Liveness, NetworkBlock, ResolveEntry};
use uuid::Uuid;

use crate::capture::CaptureSource;
use crate::dns::DnsCorrelator;
use crate::error::Result;
use crate::hosts::extract_hosts;
use crate::liveness::LivenessClassifier;
use crate::network::NetworkAggregator;
use crate::policy::Policy;

/// Mutable state of a single pipeline run.
pub struct RunContext {
    pub run_id: Uuid,
    pub correlator: DnsCorrelator,
    pub liveness: LivenessClassifier,
    pub aggregator: NetworkAggregator,
    pub active_hosts: Vec<Ipv4Addr>,
    pub inactive_hosts: Vec<Ipv4Addr>,
    pub skipped_hosts: Vec<Ipv4Addr>,
    pub resolves: Vec<ResolveEntry>,
    started: Instant,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlator: DnsCorrelator::new(),
            liveness: LivenessClassifier::new(),
            aggregator: NetworkAggregator::new(),
            active_hosts: Vec::new(),
            inactive_hosts: Vec::new(),
            skipped_hosts: Vec::new(),
            resolves: Vec::new(),
            started: Instant::now(),
        }
    }

    fn finish(self) -> RunOutcome {
        RunOutcome {
            run_id: self.run_id,
            active_hosts: self.active_hosts,
            inactive_hosts: self.inactive_hosts,
            skipped_hosts: self.skipped_hosts,
            blocks: self.aggregator.into_blocks(),
            resolves: self.resolves,
            capture_passes: self.liveness.invocations() + 2,
            duration: self.started.elapsed(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a run hands to the artifact emitters.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub active_hosts: Vec<Ipv4Addr>,
    pub inactive_hosts: Vec<Ipv4Addr>,
    pub skipped_hosts: Vec<Ipv4Addr>,
    pub blocks: Vec<NetworkBlock>,
    pub resolves: Vec<ResolveEntry>,
    /// Summary + DNS + one per classified host.
    pub capture_passes: u64,
    pub duration: Duration,
}

pub struct Pipeline<'a, S> {
    source: &'a S,
    local_addresses: &'a HashSet<Ipv4Addr>,
    policy: &'a Policy,
}

impl<'a, S: CaptureSource> Pipeline<'a, S> {
    pub fn new(source: &'a S, local_addresses: &'a HashSet<Ipv4Addr>, policy: &'a Policy) -> Self {
        Self {
            source,
            local_addresses,
            policy,
        }
    }

    /// Execute a full run against the capture.
    pub async fn run(&self) -> Result<RunOutcome> {
        let mut ctx = RunContext::new();
        tracing::info!(run_id = %ctx.run_id, "Pipeline run started");

        let candidates = extract_hosts(self.source, self.local_addresses).await?;
        self.classify_hosts(&mut ctx, candidates).await?;

        for &host in &ctx.active_hosts {
            ctx.aggregator.insert(host);
        }

        self.resolve_names(&mut ctx).await?;

        let outcome = ctx.finish();
        tracing::info!(
            run_id = %outcome.run_id,
            active = outcome.active_hosts.len(),
            inactive = outcome.inactive_hosts.len(),
            skipped = outcome.skipped_hosts.len(),
            blocks = outcome.blocks.len(),
            resolves = outcome.resolves.len(),
            capture_passes = outcome.capture_passes,
            duration_ms = outcome.duration.as_millis(),
            "Pipeline run complete"
        );
        Ok(outcome)
    }

    /// Partition candidates into active and inactive, one pass at a time.
    async fn classify_hosts(
        &self,
        ctx: &mut RunContext,
        candidates: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Result<()> {
        for host in candidates {
            if self.policy.excludes_host(host) {
                tracing::debug!(run_id = %ctx.run_id, host = %host, "Host excluded by policy");
                ctx.skipped_hosts.push(host);
                continue;
            }

            match ctx.liveness.classify(self.source, host).await? {
                Liveness::Active => ctx.active_hosts.push(host),
                _ => ctx.inactive_hosts.push(host),
            }
        }
        Ok(())
    }

    /// Correlate DNS traffic, keeping entries whose address is live.
    async fn resolve_names(&self, ctx: &mut RunContext) -> Result<()> {
        let mut lines = self.source.open(CaptureFilter::Dns).await?;
        let mut candidates = Vec::new();
        while let Some(line) = lines.next_line().await? {
            candidates.extend(ctx.correlator.ingest(&line));
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            entries = candidates.len(),
            orphan_answers = ctx.correlator.orphan_answers(),
            "DNS answers correlated"
        );

        for entry in candidates {
            if ctx.liveness.classify(self.source, entry.address).await?.is_active() {
                ctx.resolves.push(entry);
            }
        }
        Ok(())
    }
}
