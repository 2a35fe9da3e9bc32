//! DNS query/answer correlation over tcpdump `udp port 53` output.
//!
//! Queries and answers are matched by transaction ID. Each answer's record
//! list is walked by a small state machine that collects CNAME aliases and
//! A-record addresses; every address becomes one [`ResolveEntry`] carrying
//! the full name chain.
//!
//! Transaction IDs are last-write-wins: a reused ID silently replaces the
//! earlier query, so a late answer to the first query is attributed to the
//! second name.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use pcaproute_core::ResolveEntry;
use regex::Regex;

static RE_QUERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*\s>\s[0-9.]+\.53:\s([0-9]+)\+.*\sA\?\s([^\s]+)\.\s.*")
        .expect("valid DNS query regex")
});

static RE_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*\s[0-9.]+\.53\s>\s[0-9.]+:\s([0-9]+)\s[^\s]+\s(.*)")
        .expect("valid DNS answer regex")
});

// ── Line Classification ───────────────────────────────────────────

/// A DNS-mode line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsLine<'a> {
    /// `... > <ip>.53: <id>+ ... A? <name>. ...`
    Query { id: &'a str, name: &'a str },
    /// `... <ip>.53 > <ip2>: <id> <counts> <records>`
    Answer { id: &'a str, records: &'a str },
}

/// Classify one line. Lines that are neither an A query nor an answer yield
/// `None`.
pub fn classify_line(line: &str) -> Option<DnsLine<'_>> {
    if let Some(caps) = RE_QUERY.captures(line) {
        let id = caps.get(1)?.as_str();
        let name = caps.get(2)?.as_str();
        return Some(DnsLine::Query { id, name });
    }

    if let Some(caps) = RE_ANSWER.captures(line) {
        let id = caps.get(1)?.as_str();
        let records = caps.get(2)?.as_str().trim();
        return Some(DnsLine::Answer { id, records });
    }

    None
}

// ── Answer Scanner ────────────────────────────────────────────────

/// Scanner position within an answer's record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unknown,
    CnameSeen,
    ASeen,
}

/// What a single token contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Alias(String),
    Address(Ipv4Addr),
}

/// Transition table for one token.
pub fn step(state: ScanState, token: &str) -> (ScanState, Option<ScanEvent>) {
    match state {
        ScanState::Unknown => match token {
            "CNAME" => (ScanState::CnameSeen, None),
            "A" => (ScanState::ASeen, None),
            _ => (ScanState::Unknown, None),
        },
        ScanState::CnameSeen => match token {
            "A" => (ScanState::ASeen, None),
            "CNAME" => (ScanState::CnameSeen, None),
            _ => (ScanState::CnameSeen, alias_from_token(token).map(ScanEvent::Alias)),
        },
        ScanState::ASeen => match address_from_token(token) {
            Some(ip) => (ScanState::ASeen, Some(ScanEvent::Address(ip))),
            None if token == "A" => (ScanState::ASeen, None),
            None => (ScanState::Unknown, None),
        },
    }
}

/// `alias.example.com.,` -> `alias.example.com`
fn alias_from_token(token: &str) -> Option<String> {
    let name = token.split(',').next().unwrap_or(token);
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// `1.2.3.4` or `1.2.3.4,`
fn address_from_token(token: &str) -> Option<Ipv4Addr> {
    let literal = token.strip_suffix(',').unwrap_or(token);
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    literal.parse().ok()
}

/// Aliases and addresses collected from one answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerScan {
    pub aliases: Vec<String>,
    pub addresses: Vec<Ipv4Addr>,
}

/// Run the scanner over a token sequence from the initial state.
pub fn scan_answer<'a, I>(tokens: I) -> AnswerScan
where
    I: IntoIterator<Item = &'a str>,
{
    let mut state = ScanState::Unknown;
    let mut scan = AnswerScan::default();

    for token in tokens {
        let (next, event) = step(state, token.trim());
        match event {
            Some(ScanEvent::Alias(name)) => scan.aliases.push(name),
            Some(ScanEvent::Address(ip)) => scan.addresses.push(ip),
            None => {}
        }
        state = next;
    }

    scan
}

// ── Correlation ───────────────────────────────────────────────────

/// Per-run table of outstanding queries keyed by transaction ID.
#[derive(Debug, Default)]
pub struct DnsCorrelator {
    queries: HashMap<String, String>,
    orphans: u64,
}

impl DnsCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one DNS-mode line, returning the resolve entries it completes.
    pub fn ingest(&mut self, line: &str) -> Vec<ResolveEntry> {
        match classify_line(line) {
            Some(DnsLine::Query { id, name }) => {
                self.record_query(id, name);
                Vec::new()
            }
            Some(DnsLine::Answer { id, records }) => self.resolve_answer(id, records),
            None => Vec::new(),
        }
    }

    pub fn record_query(&mut self, id: &str, name: &str) {
        self.queries.insert(id.to_string(), name.to_string());
    }

    /// Correlate an answer with its query. Unknown IDs produce nothing.
    pub fn resolve_answer(&mut self, id: &str, records: &str) -> Vec<ResolveEntry> {
        let Some(queried) = self.queries.get(id) else {
            self.orphans += 1;
            return Vec::new();
        };

        let scan = scan_answer(records.split_whitespace());
        let mut names = Vec::with_capacity(scan.aliases.len() + 1);
        names.push(queried.clone());
        names.extend(scan.aliases);

        scan.addresses
            .into_iter()
            .map(|address| ResolveEntry {
                address,
                names: names.clone(),
            })
            .collect()
    }

    pub fn pending_queries(&self) -> usize {
        self.queries.len()
    }

    /// Answers dropped because no query with their ID had been seen.
    pub fn orphan_answers(&self) -> u64 {
        self.orphans
    }
}
