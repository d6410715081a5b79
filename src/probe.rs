use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::catalog::ServiceCatalog;
use crate::types::{ProbeError, ProbeResult};

const BANNER_MAX_BYTES: usize = 1024;

/// Timeouts for a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub connect_timeout: Duration,
    /// `None` skips the banner read entirely.
    pub banner_timeout: Option<Duration>,
}

impl ProbeConfig {
    /// Builds a config whose banner wait is strictly shorter than the connect timeout.
    /// A banner timeout that is not gets replaced by half the connect timeout.
    pub fn new(connect_timeout: Duration, banner_timeout: Option<Duration>) -> Self {
        let banner_timeout = banner_timeout.map(|b| {
            if b < connect_timeout {
                b
            } else {
                connect_timeout / 2
            }
        });
        Self {
            connect_timeout,
            banner_timeout,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Some(Duration::from_millis(500)))
    }
}

/// One bounded TCP connect against one `(host, port)`, optionally followed by a
/// short passive banner read.
///
/// Never fails: every outcome is encoded in the returned [`ProbeResult`]. The socket
/// is dropped, and so closed, before `probe` returns on every path.
#[derive(Debug, Clone)]
pub struct PortProbe {
    config: ProbeConfig,
    catalog: Arc<ServiceCatalog>,
}

impl PortProbe {
    pub fn new(config: ProbeConfig, catalog: Arc<ServiceCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> ProbeConfig {
        self.config
    }

    pub async fn probe(&self, ip: IpAddr, port: u16) -> ProbeResult {
        let addr = SocketAddr::new(ip, port);
        let start = Instant::now();
        let result = match time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
        {
            Ok(Ok(mut stream)) => {
                let latency = start.elapsed();
                let banner = match self.config.banner_timeout {
                    Some(wait) => read_banner(&mut stream, wait).await,
                    None => None,
                };
                let service = self.catalog.lookup(port).map(str::to_string);
                ProbeResult::open(ip, port, service, banner, latency)
            }
            Ok(Err(e)) => ProbeResult::closed(ip, port, classify_connect_error(&e), start.elapsed()),
            Err(_elapsed) => ProbeResult::closed(ip, port, ProbeError::Timeout, start.elapsed()),
        };
        trace!(%addr, open = result.open, error = ?result.error, "probe finished");
        result
    }
}

/// Map a connect failure onto the probe error classes.
pub fn classify_connect_error(e: &io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ProbeError::Refused,
        io::ErrorKind::TimedOut => ProbeError::Timeout,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeError::Unreachable
        }
        _ => ProbeError::Other(e.to_string()),
    }
}

/// First line the service volunteers, if any arrives within `wait`.
async fn read_banner(stream: &mut TcpStream, wait: Duration) -> Option<String> {
    let mut buf = vec![0u8; BANNER_MAX_BYTES];
    match time::timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let text = String::from_utf8_lossy(&buf);
            let line = text.lines().next().unwrap_or("").trim();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        }
        _ => None,
    }
}
