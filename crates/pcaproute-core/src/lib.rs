//! pcaproute-core: Shared types for the pcaproute extraction pipeline.
//!
//! This crate provides the records produced while reading a packet capture:
//! - Host records and their liveness verdict
//! - DNS resolve entries (address plus name chain)
//! - Aggregated /24 network blocks used for route tables
//! - The filter shapes handed to the capture-dump tool

pub mod types;

pub use types::{CaptureFilter, HostRecord, Liveness, NetworkBlock, ResolveEntry};
