//! Coarse OS guessing from open ports and SSH banners.
//!
//! This is a heuristic, not an authoritative fingerprint: it only looks at which
//! ports answered and at what the SSH daemon chose to announce. A host that hides
//! both is reported as `None` (unknown).
use crate::types::ProbeResult;

/// A case-insensitive banner substring and the OS label it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistroToken {
    pub token: String,
    pub label: String,
}

impl DistroToken {
    pub fn new(token: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            token: token.into().to_lowercase(),
            label: label.into(),
        }
    }
}

/// Rule chain, evaluated in order, first match wins:
/// 1. RDP port open -> `windows_label`
/// 2. SSH banner containing a distro token -> that token's label
/// 3. SSH seen without a known token -> `ssh_label`
/// 4. otherwise `None`
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    pub rdp_port: u16,
    pub ssh_port: u16,
    pub windows_label: String,
    pub ssh_label: String,
    pub distro_tokens: Vec<DistroToken>,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self {
            rdp_port: 3389,
            ssh_port: 22,
            windows_label: "Windows".into(),
            ssh_label: "Linux/Unix".into(),
            distro_tokens: vec![
                DistroToken::new("ubuntu", "Ubuntu Linux"),
                DistroToken::new("debian", "Debian Linux"),
                DistroToken::new("raspbian", "Raspbian Linux"),
                DistroToken::new("centos", "CentOS Linux"),
                DistroToken::new("fedora", "Fedora Linux"),
                DistroToken::new("rhel", "Red Hat Enterprise Linux"),
                DistroToken::new("freebsd", "FreeBSD"),
            ],
        }
    }
}

impl Fingerprinter {
    pub fn new(distro_tokens: Vec<DistroToken>) -> Self {
        Self {
            distro_tokens,
            ..Self::default()
        }
    }

    pub fn guess_os(&self, results: &[ProbeResult]) -> Option<String> {
        let open = || results.iter().filter(|r| r.open);

        if open().any(|r| r.port == self.rdp_port) {
            return Some(self.windows_label.clone());
        }

        let ssh: Vec<&ProbeResult> = open().filter(|r| self.is_ssh(r)).collect();
        for r in &ssh {
            let Some(banner) = r.banner.as_deref() else { continue };
            let banner = banner.to_lowercase();
            if let Some(d) = self.distro_tokens.iter().find(|d| banner.contains(&d.token)) {
                return Some(d.label.clone());
            }
        }

        if !ssh.is_empty() {
            return Some(self.ssh_label.clone());
        }
        None
    }

    fn is_ssh(&self, r: &ProbeResult) -> bool {
        r.port == self.ssh_port || r.banner.as_deref().is_some_and(|b| b.starts_with("SSH-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeError;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

    fn open(port: u16, banner: Option<&str>) -> ProbeResult {
        ProbeResult::open(HOST, port, None, banner.map(String::from), Duration::ZERO)
    }

    #[test]
    fn rdp_wins_over_ssh() {
        let results = vec![
            open(22, Some("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6")),
            open(3389, None),
        ];
        assert_eq!(Fingerprinter::default().guess_os(&results).as_deref(), Some("Windows"));
    }

    #[test]
    fn ssh_banner_token_names_distribution() {
        let results = vec![open(22, Some("SSH-2.0-OpenSSH_7.4 CentOS"))];
        assert_eq!(
            Fingerprinter::default().guess_os(&results).as_deref(),
            Some("CentOS Linux")
        );
    }

    #[test]
    fn ssh_without_token_is_generic_unix() {
        let results = vec![open(22, None)];
        assert_eq!(
            Fingerprinter::default().guess_os(&results).as_deref(),
            Some("Linux/Unix")
        );
    }

    #[test]
    fn ssh_banner_on_other_port_counts() {
        let results = vec![open(2222, Some("SSH-2.0-OpenSSH_9.2p1 Debian-2"))];
        assert_eq!(
            Fingerprinter::default().guess_os(&results).as_deref(),
            Some("Debian Linux")
        );
    }

    #[test]
    fn closed_ports_are_not_evidence() {
        let results = vec![
            ProbeResult::closed(HOST, 3389, ProbeError::Refused, Duration::ZERO),
            ProbeResult::closed(HOST, 22, ProbeError::Timeout, Duration::ZERO),
            open(80, Some("HTTP/1.1 400 Bad Request")),
        ];
        assert_eq!(Fingerprinter::default().guess_os(&results), None);
    }

    #[test]
    fn custom_tokens_replace_defaults() {
        let fp = Fingerprinter::new(vec![DistroToken::new("Alpine", "Alpine Linux")]);
        let results = vec![open(22, Some("SSH-2.0-OpenSSH_9.3 alpine"))];
        assert_eq!(fp.guess_os(&results).as_deref(), Some("Alpine Linux"));
    }
}
