//! CIDR host discovery over TCP reachability.
//!
//! A host counts as live when at least one of a few commonly open ports accepts a
//! connection. No ICMP is sent, so hosts that firewall all of those ports are missed.
//! Every address in the block is probed, network and broadcast addresses included.
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Instant;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DiscoveryError;
use crate::probe::PortProbe;
use crate::scheduler::ScanScheduler;
use crate::types::HostSet;

/// Ports whose reachability marks a host as live.
pub const DEFAULT_DISCOVERY_PORTS: &[u16] = &[22, 80, 443];
/// Largest block `expand_cidr` agrees to enumerate by default (a /16).
pub const DEFAULT_MAX_HOSTS: u128 = 65_536;

pub fn parse_cidr(s: &str) -> Result<IpNet, DiscoveryError> {
    s.trim()
        .parse::<IpNet>()
        .map_err(|e| DiscoveryError::InvalidCidr {
            input: s.to_string(),
            reason: e.to_string(),
        })
}

/// Number of addresses in the block.
pub fn cidr_size(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

/// Every address of the block in ascending order, network and broadcast included.
pub fn expand_cidr(net: IpNet, limit: u128) -> Result<Vec<IpAddr>, DiscoveryError> {
    let size = cidr_size(&net);
    if size > limit {
        return Err(DiscoveryError::TooLarge {
            cidr: net.to_string(),
            size,
            limit,
        });
    }
    let hosts = match net {
        IpNet::V4(n4) => {
            let start = u32::from(n4.network());
            let end = u32::from(n4.broadcast());
            (start..=end).map(|n| IpAddr::V4(Ipv4Addr::from(n))).collect()
        }
        IpNet::V6(n6) => {
            let start = u128::from(n6.network());
            let end = u128::from(n6.broadcast());
            (start..=end).map(|n| IpAddr::V6(n.into())).collect()
        }
    };
    Ok(hosts)
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>, DiscoveryError> {
    let ifaces = get_if_addrs().map_err(|e| DiscoveryError::LocalNetworks(e.to_string()))?;
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in ifaces {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    match Ipv4Net::new(ip, 24) {
        Ok(net) => net.trunc(),
        Err(_) => Ipv4Net::from(ip),
    }
}

/// Live hosts found in one or more blocks.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub hosts: HostSet,
    /// Addresses actually checked.
    pub probed: usize,
    /// Set when cancellation cut the sweep short; `hosts` is then partial.
    pub cancelled: bool,
}

impl DiscoveryOutcome {
    /// Fold the outcome of another block into this one.
    pub fn merge(&mut self, other: DiscoveryOutcome) {
        self.hosts.extend(other.hosts);
        self.probed += other.probed;
        self.cancelled |= other.cancelled;
    }
}

/// Drives liveness checks for a CIDR block through a [`ScanScheduler`].
#[derive(Debug, Clone)]
pub struct HostDiscovery {
    probe: PortProbe,
    ports: Arc<[u16]>,
    scheduler: ScanScheduler,
    max_hosts: u128,
}

impl HostDiscovery {
    /// `probe` should have its banner read disabled; only reachability matters here.
    pub fn new(probe: PortProbe, ports: Vec<u16>, scheduler: ScanScheduler) -> Self {
        Self {
            probe,
            ports: ports.into(),
            scheduler,
            max_hosts: DEFAULT_MAX_HOSTS,
        }
    }

    pub fn with_max_hosts(mut self, max_hosts: u128) -> Self {
        self.max_hosts = max_hosts;
        self
    }

    pub async fn discover(&self, cidr: &str) -> Result<DiscoveryOutcome, DiscoveryError> {
        let net = parse_cidr(cidr)?;
        self.discover_net(net).await
    }

    pub async fn discover_net(&self, net: IpNet) -> Result<DiscoveryOutcome, DiscoveryError> {
        let addrs = expand_cidr(net, self.max_hosts)?;
        let started = Instant::now();

        let probe = self.probe.clone();
        let ports = self.ports.clone();
        let outcome = self
            .scheduler
            .run(addrs, move |ip| {
                let probe = probe.clone();
                let ports = ports.clone();
                async move { is_alive(&probe, ip, &ports).await.then_some(ip) }
            })
            .await;

        let hosts: HostSet = outcome.results.into_iter().flatten().collect();
        info!(
            cidr = %net,
            probed = outcome.dispatched,
            live = hosts.len(),
            cancelled = outcome.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery finished"
        );
        Ok(DiscoveryOutcome {
            hosts,
            probed: outcome.dispatched,
            cancelled: outcome.cancelled,
        })
    }
}

/// Tries `ports` in order and stops at the first one that accepts.
pub async fn is_alive(probe: &PortProbe, ip: IpAddr, ports: &[u16]) -> bool {
    for &port in ports {
        if probe.probe(ip, port).await.open {
            return true;
        }
    }
    false
}
