//! Deployment policy: host exclusions and hosts-file name filters.
//!
//! Patterns come from configuration and are matched case-insensitively.
//! Host patterns match the dotted address; name patterns match the rendered
//! hosts-file line, so they can key on either the address or any name.

use std::net::Ipv4Addr;

use pcaproute_core::ResolveEntry;
use regex::{Regex, RegexBuilder};

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};

#[derive(Debug, Default)]
pub struct Policy {
    exclude_hosts: Vec<Regex>,
    name_allow: Vec<Regex>,
    name_deny: Vec<Regex>,
}

/// Resolve entries split by the name policy.
#[derive(Debug, Default)]
pub struct NameSelection {
    pub accepted: Vec<ResolveEntry>,
    pub rejected: Vec<ResolveEntry>,
}

impl Policy {
    pub fn from_config(config: &ExtractConfig) -> Result<Self> {
        Ok(Self {
            exclude_hosts: compile(&config.exclude_hosts)?,
            name_allow: compile(&config.name_allow)?,
            name_deny: compile(&config.name_deny)?,
        })
    }

    /// Whether a candidate host is left out of classification and routing.
    pub fn excludes_host(&self, address: Ipv4Addr) -> bool {
        let text = address.to_string();
        self.exclude_hosts.iter().any(|re| re.is_match(&text))
    }

    /// Whether a resolve entry belongs in the hosts listing.
    pub fn admits(&self, entry: &ResolveEntry) -> bool {
        let line = entry.hosts_line();
        if self.name_deny.iter().any(|re| re.is_match(&line)) {
            return false;
        }
        self.name_allow.is_empty() || self.name_allow.iter().any(|re| re.is_match(&line))
    }

    pub fn select_names(&self, entries: Vec<ResolveEntry>) -> NameSelection {
        let (accepted, rejected) = entries.into_iter().partition(|e| self.admits(e));
        NameSelection { accepted, rejected }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ExtractError::Policy {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}
