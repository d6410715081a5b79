use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ports selected for a single-host scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortSelection {
    /// Inclusive range, `start <= end`.
    Range { start: u16, end: u16 },
    /// Explicit list, deduplicated, in caller order.
    List(Vec<u16>),
}

impl PortSelection {
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortSelection::Range { start, end } => (*start..=*end).collect(),
            PortSelection::List(ports) => ports.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PortSelection::Range { start, end } => usize::from(*end - *start) + 1,
            PortSelection::List(ports) => ports.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a scan was asked to look at. Built once per invocation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanTarget {
    Host { host: String, ports: PortSelection },
    Network { cidr: IpNet },
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanTarget::Host {
                host,
                ports: PortSelection::Range { start, end },
            } => write!(f, "{host} ports {start}-{end}"),
            ScanTarget::Host {
                host,
                ports: PortSelection::List(ports),
            } => write!(f, "{host} ({} ports)", ports.len()),
            ScanTarget::Network { cidr } => write!(f, "{cidr}"),
        }
    }
}

/// Why a probe did not find an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Error)]
#[serde(rename_all = "snake_case")]
pub enum ProbeError {
    #[error("refused")]
    Refused,
    #[error("timeout")]
    Timeout,
    #[error("unreachable")]
    Unreachable,
    #[error("other: {0}")]
    Other(String),
}

/// Outcome of one TCP connect attempt against one `(host, port)`.
///
/// `open` is true exactly when `error` is `None`; closed results never carry a
/// service or banner. Use the constructors to keep that shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub host: String,
    pub port: u16,
    pub open: bool,
    pub service: Option<String>,
    pub banner: Option<String>,
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn open(
        host: IpAddr,
        port: u16,
        service: Option<String>,
        banner: Option<String>,
        latency: Duration,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            open: true,
            service,
            banner,
            latency,
            error: None,
        }
    }

    pub fn closed(host: IpAddr, port: u16, error: ProbeError, latency: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            open: false,
            service: None,
            banner: None,
            latency,
            error: Some(error),
        }
    }
}

/// Live hosts found by discovery. Deduplicated and always iterated in ascending
/// numeric order (IPv4 before IPv6).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct HostSet(BTreeSet<IpAddr>);

impl HostSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the host was already present.
    pub fn insert(&mut self, host: IpAddr) -> bool {
        self.0.insert(host)
    }

    pub fn contains(&self, host: &IpAddr) -> bool {
        self.0.contains(host)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: HostSet) {
        self.0.extend(other.0);
    }

    pub fn into_vec(self) -> Vec<IpAddr> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<IpAddr> for HostSet {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn closed_result_carries_no_service_or_banner() {
        let r = ProbeResult::closed(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            22,
            ProbeError::Refused,
            Duration::from_millis(3),
        );
        assert!(!r.open);
        assert!(r.service.is_none() && r.banner.is_none());
        assert_eq!(r.error, Some(ProbeError::Refused));
    }

    #[test]
    fn host_set_sorts_numerically_and_dedups() {
        let set: HostSet = ["10.0.0.10", "10.0.0.9", "10.0.0.10", "10.0.0.100"]
            .iter()
            .map(|s| s.parse::<IpAddr>().unwrap())
            .collect();
        let hosts: Vec<String> = set.iter().map(|h| h.to_string()).collect();
        assert_eq!(hosts, vec!["10.0.0.9", "10.0.0.10", "10.0.0.100"]);
    }

    #[test]
    fn range_selection_counts_inclusively() {
        let sel = PortSelection::Range { start: 20, end: 25 };
        assert_eq!(sel.len(), 6);
        assert_eq!(sel.ports(), vec![20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn probe_result_serializes_latency_in_millis() {
        let r = ProbeResult::open(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            80,
            Some("HTTP".into()),
            None,
            Duration::from_millis(12),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["latency_ms"], 12);
        assert_eq!(json["error"], serde_json::Value::Null);
    }
}
