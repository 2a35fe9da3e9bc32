//! Liveness classification with a per-run verdict cache.
//!
//! A host is active when the capture holds at least one packet sourced from
//! it that is UDP, or TCP with none of RST/SYN/FIN set. Each distinct address
//! costs one full pass over the capture; the verdict is cached so the DNS
//! stage can re-check addresses the host stage already classified.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use pcaproute_core::{CaptureFilter, HostRecord, Liveness};

use crate::capture::CaptureSource;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct LivenessClassifier {
    records: BTreeMap<Ipv4Addr, HostRecord>,
    invocations: u64,
}

impl LivenessClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `address`, running a capture pass only on first request.
    pub async fn classify<S: CaptureSource>(
        &mut self,
        source: &S,
        address: Ipv4Addr,
    ) -> Result<Liveness> {
        let cached = self.verdict(address);
        if cached != Liveness::Unknown {
            return Ok(cached);
        }

        self.invocations += 1;
        let lines = source.open(CaptureFilter::HostLiveness(address)).await?;
        let packets = lines.count().await?;
        let verdict = Liveness::from_packet_count(packets);

        self.records
            .entry(address)
            .or_insert_with(|| HostRecord::new(address))
            .settle(verdict);

        tracing::debug!(host = %address, packets, verdict = %verdict, "Host classified");
        Ok(verdict)
    }

    /// Cached verdict, or `Unknown` if the address has not been classified.
    pub fn verdict(&self, address: Ipv4Addr) -> Liveness {
        self.records
            .get(&address)
            .map(HostRecord::liveness)
            .unwrap_or_default()
    }

    /// Number of capture passes issued so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}
