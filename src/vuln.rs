//! Table-driven risk indicators over open ports and banners.
use crate::types::ProbeResult;

/// What an open result must look like for a rule to fire.
/// Banner substrings are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    Port(u16),
    PortAndBanner { port: u16, contains: String },
    Banner { contains: String },
}

impl RuleMatch {
    fn matches(&self, r: &ProbeResult) -> bool {
        let banner_has = |needle: &str| {
            r.banner
                .as_deref()
                .is_some_and(|b| b.to_lowercase().contains(&needle.to_lowercase()))
        };
        match self {
            RuleMatch::Port(port) => r.port == *port,
            RuleMatch::PortAndBanner { port, contains } => r.port == *port && banner_has(contains),
            RuleMatch::Banner { contains } => banner_has(contains),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnRule {
    pub when: RuleMatch,
    pub message: String,
}

impl VulnRule {
    pub fn port(port: u16, message: impl Into<String>) -> Self {
        Self {
            when: RuleMatch::Port(port),
            message: message.into(),
        }
    }

    pub fn port_banner(port: u16, contains: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: RuleMatch::PortAndBanner {
                port,
                contains: contains.into(),
            },
            message: message.into(),
        }
    }

    pub fn banner(contains: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: RuleMatch::Banner {
                contains: contains.into(),
            },
            message: message.into(),
        }
    }
}

/// Static rule table. Output follows rule order, then result order, and a rule that
/// matches several results reports each of them.
#[derive(Debug, Clone)]
pub struct VulnerabilityHeuristics {
    rules: Vec<VulnRule>,
}

impl Default for VulnerabilityHeuristics {
    fn default() -> Self {
        Self::new(vec![
            VulnRule::port_banner(21, "vsftpd 2.3.4", "CVE-2011-2523: vsftpd 2.3.4 backdoor"),
            VulnRule::port_banner(22, "openssh", "Potential SSH brute force target"),
            VulnRule::port(23, "Insecure protocol: Telnet transmits in plain text"),
            VulnRule::port(80, "HTTP service - check for web vulnerabilities"),
            VulnRule::port(443, "HTTPS service - verify SSL/TLS configuration"),
            VulnRule::port(445, "SMB exposed - audit for SMBv1 (CVE-2017-0144)"),
            VulnRule::port(3389, "RDP exposed - potential brute force target"),
            VulnRule::port(5900, "VNC exposed - verify authentication is enforced"),
            VulnRule::port(6379, "Redis exposed - verify authentication is required"),
            VulnRule::port(27017, "MongoDB exposed - verify authentication is required"),
        ])
    }
}

impl VulnerabilityHeuristics {
    pub fn new(rules: Vec<VulnRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[VulnRule] {
        &self.rules
    }

    pub fn flag(&self, results: &[ProbeResult]) -> Vec<String> {
        let mut out = Vec::new();
        for rule in &self.rules {
            for r in results.iter().filter(|r| r.open) {
                if rule.when.matches(r) {
                    out.push(rule.message.clone());
                }
            }
        }
        out
    }
}
