//! Error types for the pcaproute-extract crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to start capture tool {tool}: {source}")]
    ToolInvocation {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture tool exited with code {code} before producing output (filter: {filter})")]
    ToolFailed { filter: String, code: i32 },

    #[error("Failed reading capture tool output (filter: {filter}): {source}")]
    ToolRead {
        filter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Network interface not found: {interface}")]
    InterfaceNotFound { interface: String },

    #[error("{interface} is not assigned an IPv4 address")]
    NoLocalAddress { interface: String },

    #[error("No default gateway via {interface}")]
    NoGateway { interface: String },

    #[error("Invalid policy pattern {pattern:?}: {source}")]
    Policy {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
