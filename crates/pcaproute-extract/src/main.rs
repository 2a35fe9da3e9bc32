//! CLI entry point for the pcaproute extractor.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pcaproute_extract::capture::TcpdumpSource;
use pcaproute_extract::emit::{self, ArtifactLayout};
use pcaproute_extract::hosts::extract_hosts;
use pcaproute_extract::netif;
use pcaproute_extract::pipeline::Pipeline;
use pcaproute_extract::policy::Policy;

#[derive(Parser)]
#[command(name = "pcaproute")]
#[command(about = "Build route scripts and a hosts file from a packet capture")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: pcaproute).
    #[arg(short, long, default_value = "pcaproute", global = true)]
    config: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract live hosts, route blocks and name resolution from a capture,
    /// then write route add/del scripts, host lists and a hosts file.
    ExtractAll {
        /// Capture file (pcap).
        file: PathBuf,

        /// Network interface the routes will be attached to.
        #[arg(short, long)]
        interface: String,

        /// Suffix for the generated file names.
        #[arg(short, long)]
        domain: String,

        /// Output directory (overrides config).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print every host in the capture, sorted by address.
    PrintHosts {
        /// Capture file (pcap).
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let config = pcaproute_extract::config::load(&cli.config)?;

    match cli.command {
        Command::ExtractAll {
            file,
            interface,
            domain,
            output_dir,
        } => {
            if domain.is_empty() {
                anyhow::bail!("--domain must not be empty");
            }
            let policy = Policy::from_config(&config)?;

            // Interface prerequisites come before any capture pass.
            let prereqs = netif::discover(&interface).await?;

            let source = TcpdumpSource::new(&config.tcpdump_path, &file);
            let version = source.verify_installation().await?;
            tracing::info!(tcpdump_version = %version.trim(), "Tcpdump verified");

            let outcome = Pipeline::new(&source, &prereqs.local_addresses, &policy)
                .run()
                .await?;

            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output_dir));
            let layout = ArtifactLayout::new(output_dir, &domain, &interface);
            emit::write_artifacts(&layout, &outcome, &policy, prereqs.gateway)?;
        }
        Command::PrintHosts { file } => {
            let source = TcpdumpSource::new(&config.tcpdump_path, &file);
            let hosts = extract_hosts(&source, &HashSet::new()).await?;
            for host in hosts {
                println!("{host}");
            }
        }
    }

    Ok(())
}
