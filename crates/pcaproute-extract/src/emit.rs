//! Artifact emitters for a completed run.
//!
//! Every file is named `<artifact>.<domain>.<interface>` inside the output
//! directory. The route scripts take the gateway and device as `$1`/`$2`
//! so they can be replayed against a different uplink.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pcaproute_core::{NetworkBlock, ResolveEntry};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::RunOutcome;
use crate::policy::Policy;

/// Where artifacts go and how they are suffixed.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub output_dir: PathBuf,
    pub domain: String,
    pub interface: String,
}

impl ArtifactLayout {
    pub fn new(output_dir: impl AsRef<Path>, domain: &str, interface: &str) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            domain: domain.to_string(),
            interface: interface.to_string(),
        }
    }

    pub fn path(&self, artifact: &str) -> PathBuf {
        self.output_dir
            .join(format!("{artifact}.{}.{}", self.domain, self.interface))
    }
}

/// Machine-readable record of what a run produced.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub interface: String,
    pub gateway: Ipv4Addr,
    pub active_hosts: usize,
    pub inactive_hosts: usize,
    pub skipped_hosts: usize,
    pub route_blocks: usize,
    pub name_resolves: usize,
    pub name_resolves_skipped: usize,
    pub capture_passes: u64,
    pub duration_ms: u64,
}

/// Write every artifact for `outcome`, returning the summary written.
pub fn write_artifacts(
    layout: &ArtifactLayout,
    outcome: &RunOutcome,
    policy: &Policy,
    gateway: Ipv4Addr,
) -> Result<RunSummary> {
    fs::create_dir_all(&layout.output_dir)?;
    let generated_at = Utc::now();

    write_lines(&layout.path("active-hosts"), &outcome.active_hosts)?;
    write_lines(&layout.path("inactive-hosts"), &outcome.inactive_hosts)?;

    write_script(
        &layout.path("route-table-add"),
        &route_script("add", &outcome.blocks, generated_at),
    )?;
    write_script(
        &layout.path("route-table-del"),
        &route_script("del", &outcome.blocks, generated_at),
    )?;

    let names = policy.select_names(outcome.resolves.clone());
    fs::write(layout.path("name-resolve"), hosts_listing(&names.accepted))?;

    let mut skipped = address_lines(&outcome.skipped_hosts);
    skipped.push_str(&hosts_listing(&names.rejected));
    fs::write(layout.path("skip"), skipped)?;

    let summary = RunSummary {
        run_id: outcome.run_id,
        generated_at,
        interface: layout.interface.clone(),
        gateway,
        active_hosts: outcome.active_hosts.len(),
        inactive_hosts: outcome.inactive_hosts.len(),
        skipped_hosts: outcome.skipped_hosts.len(),
        route_blocks: outcome.blocks.len(),
        name_resolves: names.accepted.len(),
        name_resolves_skipped: names.rejected.len(),
        capture_passes: outcome.capture_passes,
        duration_ms: u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX),
    };
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(
        layout.output_dir.join(format!(
            "summary.{}.{}.json",
            layout.domain, layout.interface
        )),
        json,
    )?;

    tracing::info!(
        run_id = %outcome.run_id,
        output_dir = %layout.output_dir.display(),
        route_blocks = summary.route_blocks,
        name_resolves = summary.name_resolves,
        "Artifacts written"
    );

    Ok(summary)
}

/// A `#!/bin/sh` script adding or deleting one route per block.
pub fn route_script(verb: &str, blocks: &[NetworkBlock], generated_at: DateTime<Utc>) -> String {
    let mut script = format!(
        "#!/bin/sh\n# generated by pcaproute at {}\n# usage: $0 <gateway> <device>\n",
        generated_at.to_rfc3339()
    );
    for block in blocks {
        script.push_str(&format!("ip route {verb} {block} via $1 dev $2\n"));
    }
    script
}

/// Hosts-file lines, one per entry.
pub fn hosts_listing(entries: &[ResolveEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}\n", e.hosts_line()))
        .collect()
}

fn address_lines(hosts: &[Ipv4Addr]) -> String {
    hosts.iter().map(|h| format!("{h}\n")).collect()
}

fn write_lines(path: &Path, hosts: &[Ipv4Addr]) -> Result<()> {
    fs::write(path, address_lines(hosts))?;
    Ok(())
}

fn write_script(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ExtractConfig;

    fn outcome() -> RunOutcome {
        RunOutcome {
            run_id: Uuid::new_v4(),
            active_hosts: vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 1, 7)],
            inactive_hosts: vec![Ipv4Addr::new(10, 0, 0, 9)],
            skipped_hosts: vec![Ipv4Addr::new(0, 0, 0, 1)],
            blocks: vec![
                NetworkBlock::containing(Ipv4Addr::new(10, 0, 0, 5)),
                NetworkBlock::containing(Ipv4Addr::new(10, 0, 1, 7)),
            ],
            resolves: vec![
                ResolveEntry {
                    address: Ipv4Addr::new(10, 0, 0, 5),
                    names: vec!["svc.example.com".to_string()],
                },
                ResolveEntry {
                    address: Ipv4Addr::new(10, 0, 1, 7),
                    names: vec!["ads.tracker.net".to_string(), "edge.tracker.net".to_string()],
                },
            ],
            capture_passes: 5,
            duration: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_route_script_lines() {
        let blocks = vec![NetworkBlock::containing(Ipv4Addr::new(10, 0, 0, 5))];
        let script = route_script("add", &blocks, Utc::now());
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.ends_with("ip route add 10.0.0.0/24 via $1 dev $2\n"));
    }

    #[test]
    fn test_route_script_layout() {
        let blocks = vec![
            NetworkBlock::containing(Ipv4Addr::new(10, 0, 0, 5)),
            NetworkBlock::containing(Ipv4Addr::new(10, 0, 1, 7)),
        ];
        let script = route_script("del", &blocks, Utc::now());
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("# generated by pcaproute at "));
        assert_eq!(lines[2], "# usage: $0 <gateway> <device>");
        assert_eq!(lines[3], "ip route del 10.0.0.0/24 via $1 dev $2");
        assert_eq!(lines[4], "ip route del 10.0.1.0/24 via $1 dev $2");
    }

    #[test]
    fn test_summary_duration_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), "corp", "tun0");
        let mut outcome = outcome();

        let summary =
            write_artifacts(&layout, &outcome, &Policy::default(), Ipv4Addr::new(10, 8, 0, 1))
                .unwrap();
        assert_eq!(summary.duration_ms, 12);

        outcome.duration = Duration::MAX;
        let summary =
            write_artifacts(&layout, &outcome, &Policy::default(), Ipv4Addr::new(10, 8, 0, 1))
                .unwrap();
        assert_eq!(summary.duration_ms, u64::MAX);
    }

    #[test]
    fn test_layout_path_suffix() {
        let layout = ArtifactLayout::new("/tmp/out", "corp", "tun0");
        assert_eq!(
            layout.path("active-hosts"),
            PathBuf::from("/tmp/out/active-hosts.corp.tun0")
        );
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), "corp", "tun0");
        let policy = Policy::from_config(&ExtractConfig {
            name_deny: vec![r"tracker\.net".to_string()],
            ..Default::default()
        })
        .unwrap();

        let summary =
            write_artifacts(&layout, &outcome(), &policy, Ipv4Addr::new(10, 8, 0, 1)).unwrap();

        let read = |name: &str| fs::read_to_string(layout.path(name)).unwrap();
        assert_eq!(read("active-hosts"), "10.0.0.5\n10.0.1.7\n");
        assert_eq!(read("inactive-hosts"), "10.0.0.9\n");
        assert_eq!(read("name-resolve"), "10.0.0.5\t\tsvc.example.com\n");
        assert_eq!(
            read("skip"),
            "0.0.0.1\n10.0.1.7\t\tads.tracker.net edge.tracker.net\n"
        );

        let add = read("route-table-add");
        assert!(add.contains("ip route add 10.0.0.0/24 via $1 dev $2\n"));
        assert!(add.contains("ip route add 10.0.1.0/24 via $1 dev $2\n"));
        assert!(read("route-table-del").contains("ip route del 10.0.1.0/24 via $1 dev $2\n"));

        assert_eq!(summary.name_resolves, 1);
        assert_eq!(summary.name_resolves_skipped, 1);
        let json = fs::read_to_string(dir.path().join("summary.corp.tun0.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["gateway"], "10.8.0.1");
        assert_eq!(value["route_blocks"], 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_route_scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), "corp", "tun0");
        write_artifacts(&layout, &outcome(), &Policy::default(), Ipv4Addr::new(10, 8, 0, 1))
            .unwrap();

        let mode = fs::metadata(layout.path("route-table-add"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
