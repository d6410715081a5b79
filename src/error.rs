//! Error types for the scanning engine.
//!
//! Only input-level problems are surfaced as `Err`. Per-probe network failures are
//! data and live in [`crate::types::ProbeError`] inside each `ProbeResult`.
use std::path::PathBuf;

use thiserror::Error;

/// Invalid caller input, reported before any scanning begins.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("cannot resolve host {host}: {reason}")]
    UnresolvableHost { host: String, reason: String },

    #[error("invalid port {value:?}: {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("invalid port range {start}-{end} (start > end)")]
    InvalidRange { start: u16, end: u16 },

    #[error("port list is empty")]
    EmptyPortList,

    #[error("ports file line {line}: {reason}")]
    PortsFile { line: usize, reason: String },

    #[error("failed to read ports file {}: {source}", path.display())]
    ReadPortsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Failure of a discovery call as a whole (never of a single host).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("invalid CIDR {input:?}: {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("CIDR {cidr} holds {size} addresses, more than the limit of {limit}")]
    TooLarge { cidr: String, size: u128, limit: u128 },

    #[error("failed to detect local networks: {0}")]
    LocalNetworks(String),
}
