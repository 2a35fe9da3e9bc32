//! Host extraction from summary-mode tcpdump output.
//!
//! Summary lines look like
//! `12:00:00.000000 IP 192.168.1.10.51234 > 10.0.0.5.443: Flags [P.], ...`.
//! Both address tokens are normalized to bare IPv4 addresses (the port
//! suffix, if any, is dropped) and collected into a set.

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use pcaproute_core::CaptureFilter;
use regex::Regex;

use crate::capture::CaptureSource;
use crate::error::Result;

static RE_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9:.]+ IP ([0-9.]+) [<>] ([0-9.]+)").expect("valid summary line regex")
});

/// Reduce an `ip` or `ip.port` token to its address part.
///
/// Four dot-separated parts are returned verbatim; more than four keep the
/// first four. Anything shorter is not an address.
pub fn normalize_address_token(token: &str) -> Option<&str> {
    let parts = token.split('.').count();
    if parts < 4 {
        return None;
    }
    if parts == 4 {
        return Some(token);
    }

    let end = token
        .match_indices('.')
        .nth(3)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    Some(&token[..end])
}

/// Source and destination addresses of one summary line.
pub fn parse_summary_line(line: &str) -> Vec<Ipv4Addr> {
    let Some(caps) = RE_SUMMARY.captures(line) else {
        return Vec::new();
    };

    [caps.get(1), caps.get(2)]
        .into_iter()
        .flatten()
        .filter_map(|m| normalize_address_token(m.as_str()))
        .filter_map(|token| token.parse::<Ipv4Addr>().ok())
        .collect()
}

/// Accumulates the remote hosts seen across summary lines.
pub struct HostExtractor<'a> {
    local_addresses: &'a HashSet<Ipv4Addr>,
    hosts: BTreeSet<Ipv4Addr>,
}

impl<'a> HostExtractor<'a> {
    pub fn new(local_addresses: &'a HashSet<Ipv4Addr>) -> Self {
        Self {
            local_addresses,
            hosts: BTreeSet::new(),
        }
    }

    pub fn ingest(&mut self, line: &str) {
        for ip in parse_summary_line(line) {
            if !self.local_addresses.contains(&ip) {
                self.hosts.insert(ip);
            }
        }
    }

    pub fn finish(self) -> BTreeSet<Ipv4Addr> {
        self.hosts
    }
}

/// Run one summary pass over the capture and return every non-local host.
pub async fn extract_hosts<S: CaptureSource>(
    source: &S,
    local_addresses: &HashSet<Ipv4Addr>,
) -> Result<BTreeSet<Ipv4Addr>> {
    let mut lines = source.open(CaptureFilter::Summary).await?;
    let mut extractor = HostExtractor::new(local_addresses);

    while let Some(line) = lines.next_line().await? {
        extractor.ingest(&line);
    }

    let hosts = extractor.finish();
    tracing::info!(hosts = hosts.len(), "Extracted hosts from capture");
    Ok(hosts)
}
