//! Core domain types for the pcaproute pipeline.
//!
//! Every record here is derived from text emitted by the capture-dump tool
//! and lives only for the duration of a single pipeline run.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

// ── Capture Filters ───────────────────────────────────────────────

/// The packet selections the pipeline asks the capture-dump tool for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureFilter {
    /// Every IPv4 packet, one summary line each.
    Summary,
    /// DNS traffic: UDP port 53.
    Dns,
    /// Packets sourced from one host that carry UDP, or TCP segments with
    /// none of RST/SYN/FIN set.
    HostLiveness(Ipv4Addr),
}

impl CaptureFilter {
    /// Filter expression arguments, appended after `-r <file> -nn`.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Summary => vec!["ip".to_string()],
            Self::Dns => vec!["udp".to_string(), "port".to_string(), "53".to_string()],
            Self::HostLiveness(ip) => vec![
                "src".to_string(),
                "host".to_string(),
                ip.to_string(),
                "and".to_string(),
                "(".to_string(),
                "udp".to_string(),
                "or".to_string(),
                "(".to_string(),
                "tcp".to_string(),
                "and".to_string(),
                "tcp[tcpflags] & (tcp-rst|tcp-syn|tcp-fin) == 0".to_string(),
                ")".to_string(),
                ")".to_string(),
            ],
        }
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

// ── Hosts ─────────────────────────────────────────────────────────

/// Whether substantive traffic was observed from an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Unknown,
    Active,
    Inactive,
}

impl Liveness {
    pub fn from_packet_count(packets: u64) -> Self {
        if packets > 0 {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

/// A remote host seen in the capture.
///
/// The liveness verdict moves from `Unknown` to a final value exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub address: Ipv4Addr,
    liveness: Liveness,
}

impl HostRecord {
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            liveness: Liveness::Unknown,
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Record the verdict. Returns `false` (and changes nothing) if a verdict
    /// was already recorded or `verdict` is `Unknown`.
    pub fn settle(&mut self, verdict: Liveness) -> bool {
        if self.liveness != Liveness::Unknown || verdict == Liveness::Unknown {
            return false;
        }
        self.liveness = verdict;
        true
    }
}

// ── Name Resolution ───────────────────────────────────────────────

/// One address from a DNS answer together with the name chain that led to it.
///
/// `names[0]` is the queried name; later entries are CNAME aliases in the
/// order the answer listed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveEntry {
    pub address: Ipv4Addr,
    pub names: Vec<String>,
}

impl ResolveEntry {
    /// Render as a hosts-file line: `<ip>\t\t<name1> <name2> ...`.
    pub fn hosts_line(&self) -> String {
        format!("{}\t\t{}", self.address, self.names.join(" "))
    }
}

impl fmt::Display for ResolveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hosts_line())
    }
}

// ── Route Blocks ──────────────────────────────────────────────────

/// Prefix length used for route aggregation.
pub const ROUTE_PREFIX_LEN: u8 = 24;

/// A `/24` network covering one or more live hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkBlock(pub Ipv4Net);

impl NetworkBlock {
    /// The block containing `address`: its first three octets plus `.0/24`.
    pub fn containing(address: Ipv4Addr) -> Self {
        let net = Ipv4Net::new(address, ROUTE_PREFIX_LEN)
            .expect("24 is a valid IPv4 prefix length")
            .trunc();
        Self(net)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }
}

impl fmt::Display for NetworkBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_and_dns_filter_args() {
        assert_eq!(CaptureFilter::Summary.args(), vec!["ip"]);
        assert_eq!(CaptureFilter::Dns.to_string(), "udp port 53");
    }

    #[test]
    fn test_liveness_filter_expression() {
        let filter = CaptureFilter::HostLiveness(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(
            filter.to_string(),
            "src host 10.0.0.5 and ( udp or ( tcp and tcp[tcpflags] & (tcp-rst|tcp-syn|tcp-fin) == 0 ) )"
        );
    }

    #[test]
    fn test_host_record_settles_once() {
        let mut host = HostRecord::new(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(host.liveness(), Liveness::Unknown);
        assert!(!host.settle(Liveness::Unknown));
        assert!(host.settle(Liveness::Active));
        assert!(!host.settle(Liveness::Inactive));
        assert_eq!(host.liveness(), Liveness::Active);
    }

    #[test]
    fn test_liveness_from_packet_count() {
        assert_eq!(Liveness::from_packet_count(0), Liveness::Inactive);
        assert_eq!(Liveness::from_packet_count(3), Liveness::Active);
        assert_eq!(
            serde_json::to_string(&Liveness::Inactive).unwrap(),
            "\"inactive\""
        );
    }

    #[test]
    fn test_resolve_entry_hosts_line() {
        let entry = ResolveEntry {
            address: Ipv4Addr::new(1, 2, 3, 4),
            names: vec!["foo.bar.com".to_string(), "alias1".to_string()],
        };
        assert_eq!(entry.hosts_line(), "1.2.3.4\t\tfoo.bar.com alias1");
    }

    #[test]
    fn test_network_block_truncates_last_octet() {
        let block = NetworkBlock::containing(Ipv4Addr::new(172, 217, 24, 99));
        assert_eq!(block.to_string(), "172.217.24.0/24");
        assert_eq!(block.network(), Ipv4Addr::new(172, 217, 24, 0));
        assert_eq!(
            block,
            NetworkBlock::containing(Ipv4Addr::new(172, 217, 24, 1))
        );
    }
}
