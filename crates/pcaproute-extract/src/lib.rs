//! pcaproute-extract: Turn a packet capture into route and hosts artifacts.
//!
//! Wraps tcpdump to read a capture file, extracts the remote hosts and DNS
//! name resolutions it contains, keeps only hosts that carried real traffic,
//! and aggregates them into /24 route blocks.

pub mod capture;
pub mod config;
pub mod dns;
pub mod emit;
pub mod error;
pub mod hosts;
pub mod liveness;
pub mod netif;
pub mod network;
pub mod pipeline;
pub mod policy;
