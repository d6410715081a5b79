use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprinter;
use crate::types::{duration_ms, ProbeResult, ScanTarget};
use crate::vuln::VulnerabilityHeuristics;

/// Final, read-only result of one host scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: ScanTarget,
    /// Sorted by port, one entry per `(host, port)`.
    pub results: Vec<ProbeResult>,
    pub open_count: usize,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub os_guess: Option<String>,
    pub vulnerabilities: Vec<String>,
    pub started_at: String,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn open_ports(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.open)
    }
}

/// Turns the drained scheduler output into a [`ScanReport`].
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    fingerprinter: Fingerprinter,
    heuristics: VulnerabilityHeuristics,
}

impl ReportAssembler {
    pub fn new(fingerprinter: Fingerprinter, heuristics: VulnerabilityHeuristics) -> Self {
        Self {
            fingerprinter,
            heuristics,
        }
    }

    pub fn assemble(
        &self,
        target: ScanTarget,
        mut results: Vec<ProbeResult>,
        duration: Duration,
    ) -> ScanReport {
        // Open sorts ahead of closed for the same (port, host), so dedup keeps it.
        results.sort_by(|a, b| {
            a.port
                .cmp(&b.port)
                .then_with(|| a.host.cmp(&b.host))
                .then_with(|| b.open.cmp(&a.open))
        });
        results.dedup_by(|a, b| a.port == b.port && a.host == b.host);

        let open_count = results.iter().filter(|r| r.open).count();
        let os_guess = self.fingerprinter.guess_os(&results);
        let vulnerabilities = self.heuristics.flag(&results);

        ScanReport {
            target,
            results,
            open_count,
            duration,
            os_guess,
            vulnerabilities,
            started_at: rfc3339_ago(duration),
            cancelled: false,
        }
    }
}

/// UTC timestamp of the moment `elapsed` ago.
fn rfc3339_ago(elapsed: Duration) -> String {
    let then = OffsetDateTime::now_utc() - elapsed;
    then.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortSelection, ProbeError};
    use std::net::{IpAddr, Ipv4Addr};

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn target() -> ScanTarget {
        ScanTarget::Host {
            host: "127.0.0.1".into(),
            ports: PortSelection::Range { start: 20, end: 25 },
        }
    }

    #[test]
    fn sorts_by_port_and_counts_open() {
        let results = vec![
            ProbeResult::closed(HOST, 25, ProbeError::Refused, Duration::ZERO),
            ProbeResult::open(HOST, 22, Some("SSH".into()), None, Duration::ZERO),
            ProbeResult::closed(HOST, 20, ProbeError::Timeout, Duration::ZERO),
            ProbeResult::open(HOST, 23, Some("Telnet".into()), None, Duration::ZERO),
        ];
        let report = ReportAssembler::default().assemble(target(), results, Duration::from_secs(1));

        let ports: Vec<u16> = report.results.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![20, 22, 23, 25]);
        assert_eq!(report.open_count, 2);
        assert_eq!(report.open_ports().count(), 2);
        assert_eq!(report.os_guess.as_deref(), Some("Linux/Unix"));
        assert_eq!(
            report.vulnerabilities,
            vec!["Insecure protocol: Telnet transmits in plain text"]
        );
    }

    #[test]
    fn drops_duplicate_host_port_pairs() {
        let results = vec![
            ProbeResult::closed(HOST, 80, ProbeError::Refused, Duration::ZERO),
            ProbeResult::closed(HOST, 80, ProbeError::Refused, Duration::ZERO),
        ];
        let report = ReportAssembler::default().assemble(target(), results, Duration::ZERO);
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn open_duplicate_beats_closed_one() {
        let results = vec![
            ProbeResult::closed(HOST, 22, ProbeError::Timeout, Duration::ZERO),
            ProbeResult::open(HOST, 22, Some("SSH".into()), None, Duration::ZERO),
            ProbeResult::closed(HOST, 22, ProbeError::Refused, Duration::ZERO),
        ];
        let report = ReportAssembler::default().assemble(target(), results, Duration::ZERO);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].open);
        assert_eq!(report.open_count, 1);
    }

    #[test]
    fn empty_scan_is_a_valid_report() {
        let report = ReportAssembler::default().assemble(target(), Vec::new(), Duration::ZERO);
        assert_eq!(report.open_count, 0);
        assert!(report.os_guess.is_none());
        assert!(report.vulnerabilities.is_empty());
        assert!(!report.started_at.is_empty());
    }
}
