use std::collections::HashSet;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::ServiceCatalog;
use crate::discovery::{self, DiscoveryOutcome, HostDiscovery, DEFAULT_DISCOVERY_PORTS, DEFAULT_MAX_HOSTS};
use crate::error::InputError;
use crate::fingerprint::Fingerprinter;
use crate::probe::{PortProbe, ProbeConfig};
use crate::report::{ReportAssembler, ScanReport};
use crate::scheduler::{ScanScheduler, DEFAULT_CONCURRENCY};
use crate::types::{PortSelection, ProbeError, ProbeResult, ScanTarget};
use crate::vuln::VulnerabilityHeuristics;

/// Callback fired once per probe result, as soon as it exists. A panic inside it
/// is caught and logged; the result still lands in the report.
pub type ResultObserver = Arc<dyn Fn(&ProbeResult) + Send + Sync>;

/// Knobs for a [`Scanner`]. `Default` gives the historical values.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub concurrency: usize,
    pub connect_timeout: Duration,
    /// Normalised to stay below `connect_timeout`.
    pub banner_timeout: Option<Duration>,
    pub discovery_timeout: Duration,
    pub discovery_ports: Vec<u16>,
    pub max_discovery_hosts: u128,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: Duration::from_millis(1000),
            banner_timeout: Some(Duration::from_millis(500)),
            discovery_timeout: Duration::from_millis(1000),
            discovery_ports: DEFAULT_DISCOVERY_PORTS.to_vec(),
            max_discovery_hosts: DEFAULT_MAX_HOSTS,
        }
    }
}

/// Entry point of the engine: validates input, fans probes out over the scheduler
/// and hands the drained results to the report assembler.
pub struct Scanner {
    config: ScanConfig,
    catalog: Arc<ServiceCatalog>,
    assembler: ReportAssembler,
    cancel: CancellationToken,
    observer: Option<ResultObserver>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            catalog: Arc::new(ServiceCatalog::default()),
            assembler: ReportAssembler::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_rules(mut self, fingerprinter: Fingerprinter, heuristics: VulnerabilityHeuristics) -> Self {
        self.assembler = ReportAssembler::new(fingerprinter, heuristics);
        self
    }

    /// Firing the token stops dispatching new probes; accepted ones still finish.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: ResultObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the inclusive range `start..=end` on `host`.
    pub async fn scan_range(&self, host: &str, start: u16, end: u16) -> Result<ScanReport, InputError> {
        if start == 0 {
            return Err(InputError::InvalidPort {
                value: "0".into(),
                reason: "out of range 1-65535".into(),
            });
        }
        if start > end {
            return Err(InputError::InvalidRange { start, end });
        }
        self.scan(host, PortSelection::Range { start, end }).await
    }

    /// Scan an explicit port list on `host`.
    pub async fn scan_ports(&self, host: &str, ports: &[u16]) -> Result<ScanReport, InputError> {
        if ports.is_empty() {
            return Err(InputError::EmptyPortList);
        }
        if ports.contains(&0) {
            return Err(InputError::InvalidPort {
                value: "0".into(),
                reason: "out of range 1-65535".into(),
            });
        }
        let mut unique = Vec::with_capacity(ports.len());
        for &p in ports {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        self.scan(host, PortSelection::List(unique)).await
    }

    async fn scan(&self, host: &str, ports: PortSelection) -> Result<ScanReport, InputError> {
        let ip = resolve_host(host).await?;
        let target = ScanTarget::Host {
            host: host.trim().to_string(),
            ports: ports.clone(),
        };
        let started = Instant::now();

        let probe = PortProbe::new(
            ProbeConfig::new(self.config.connect_timeout, self.config.banner_timeout),
            self.catalog.clone(),
        );
        let observer = self.observer.clone();
        let outcome = self
            .scheduler()
            .run(ports.ports(), move |port| {
                let probe = probe.clone();
                let observer = observer.clone();
                async move {
                    let result = probe.probe(ip, port).await;
                    if let Some(observe) = &observer {
                        if panic::catch_unwind(AssertUnwindSafe(|| observe(&result))).is_err() {
                            warn!(port, "result observer panicked");
                        }
                    }
                    result
                }
            })
            .await;

        let mut results = outcome.results;
        if outcome.panicked > 0 {
            // Dispatch follows selection order: the first `dispatched` ports are owed a result.
            let seen: HashSet<u16> = results.iter().map(|r| r.port).collect();
            let missing: Vec<u16> = ports
                .ports()
                .into_iter()
                .take(outcome.dispatched)
                .filter(|p| !seen.contains(p))
                .collect();
            for port in missing {
                results.push(ProbeResult::closed(
                    ip,
                    port,
                    ProbeError::Other("worker panicked".into()),
                    Duration::ZERO,
                ));
            }
        }

        let duration = started.elapsed();
        let mut report = self.assembler.assemble(target, results, duration);
        report.cancelled = outcome.cancelled;
        info!(
            target = %report.target,
            %ip,
            probed = report.results.len(),
            open = report.open_count,
            cancelled = report.cancelled,
            elapsed_ms = duration.as_millis() as u64,
            "scan finished"
        );
        Ok(report)
    }

    /// Find live hosts in `cidr`. A cancelled sweep still returns `Ok`, with
    /// [`DiscoveryOutcome::cancelled`] set.
    pub async fn discover(&self, cidr: &str) -> Result<DiscoveryOutcome, InputError> {
        let net = discovery::parse_cidr(cidr)?;
        self.discover_net(net).await
    }

    pub async fn discover_net(&self, net: IpNet) -> Result<DiscoveryOutcome, InputError> {
        let probe = PortProbe::new(
            ProbeConfig::new(self.config.discovery_timeout, None),
            self.catalog.clone(),
        );
        let found = HostDiscovery::new(probe, self.config.discovery_ports.clone(), self.scheduler())
            .with_max_hosts(self.config.max_discovery_hosts)
            .discover_net(net)
            .await?;
        Ok(found)
    }

    fn scheduler(&self) -> ScanScheduler {
        ScanScheduler::new(self.config.concurrency).with_cancel(self.cancel.clone())
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

/// Resolve `host` to one address, preferring IPv4. Literal IPs skip DNS.
pub async fn resolve_host(host: &str) -> Result<IpAddr, InputError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(InputError::EmptyHost);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let unresolvable = |reason: String| InputError::UnresolvableHost {
        host: host.to_string(),
        reason,
    };
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| unresolvable(e.to_string()))?
        .map(|sa| sa.ip())
        .collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| unresolvable("no addresses found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ip_resolves_without_dns() {
        let ip = resolve_host(" 127.0.0.1 ").await.unwrap();
        assert_eq!(ip.to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        assert!(matches!(resolve_host("  ").await, Err(InputError::EmptyHost)));
    }

    #[tokio::test]
    async fn invalid_input_fails_before_scanning() {
        let scanner = Scanner::default();
        assert!(matches!(
            scanner.scan_range("127.0.0.1", 30, 20).await,
            Err(InputError::InvalidRange { start: 30, end: 20 })
        ));
        assert!(scanner.scan_range("127.0.0.1", 0, 20).await.is_err());
        assert!(matches!(
            scanner.scan_ports("127.0.0.1", &[]).await,
            Err(InputError::EmptyPortList)
        ));
        assert!(matches!(
            scanner.discover("10.0.0.0/40").await,
            Err(InputError::Discovery(_))
        ));
    }
}
