//! Concurrent TCP reconnaissance engine: bounded-concurrency connect scans with banner
//! grabbing, CIDR host discovery, and heuristic OS and risk hints over the results.
pub mod catalog;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod types;
pub mod vuln;

pub use discovery::DiscoveryOutcome;
pub use error::{DiscoveryError, InputError};
pub use report::ScanReport;
pub use scanner::{ScanConfig, Scanner};
pub use types::{HostSet, PortSelection, ProbeError, ProbeResult, ScanTarget};
