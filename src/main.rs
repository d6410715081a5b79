use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use netrecon::catalog::COMMON_PORTS;
use netrecon::types::ProbeResult;
use netrecon::scanner::resolve_host;
use netrecon::{discovery, logging, ports};
use netrecon::{DiscoveryOutcome, InputError, ScanConfig, ScanReport, Scanner};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const BANNER_DISPLAY_CHARS: usize = 30;

/// netrecon: bounded-concurrency TCP port scanner with banner grabbing and host discovery.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netrecon",
    version,
    about = "Bounded-concurrency TCP port scanner with banner grabbing and host discovery.",
    long_about = "Only scan systems you own or have explicit permission to test."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Max concurrent TCP connect attempts.
    #[arg(long, global = true, default_value_t = 100)]
    concurrency: usize,

    /// Socket connect timeout in milliseconds.
    #[arg(long = "timeout-ms", global = true, default_value_t = 1000)]
    timeout_ms: u64,

    /// How long to wait for a service banner after connecting, in milliseconds.
    #[arg(long = "banner-timeout-ms", global = true, default_value_t = 500)]
    banner_timeout_ms: u64,

    /// Connect timeout for each host liveness probe, in milliseconds.
    #[arg(long = "discovery-timeout-ms", global = true, default_value_t = 1000)]
    discovery_timeout_ms: u64,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log level for diagnostics on stderr; RUST_LOG overrides it.
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan an inclusive TCP port range on one host.
    Scan {
        host: String,
        start_port: String,
        end_port: String,
    },
    /// Scan the well-known port list (or a ports file) on one host.
    ScanCommon {
        host: String,
        /// File with one port or `a-b` range per line; `#` starts a comment.
        #[arg(long = "ports-file")]
        ports_file: Option<PathBuf>,
    },
    /// Find live hosts in a CIDR block. Without one, local /24 networks are used.
    Discover { cidr: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("Warning: {e:#}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), InputError> {
    // Ctrl-C stops dispatching new probes; in-flight ones finish and are reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let config = ScanConfig {
        concurrency: cli.concurrency,
        connect_timeout: Duration::from_millis(cli.timeout_ms),
        banner_timeout: Some(Duration::from_millis(cli.banner_timeout_ms)),
        discovery_timeout: Duration::from_millis(cli.discovery_timeout_ms),
        ..ScanConfig::default()
    };
    let scanner = Scanner::new(config)
        .with_cancel(cancel)
        .with_observer(Arc::new(print_open_port));

    match cli.command {
        Command::Scan {
            host,
            start_port,
            end_port,
        } => {
            let (start, end) = check_scan_args(&host, &start_port, &end_port).await?;
            println!("Only scan systems you have explicit permission to test!");
            println!("\nStarting port scan on {host} (Ports {start}-{end})\n");
            let report = scanner.scan_range(&host, start, end).await?;
            print_report(&report);
            write_output(cli.output.as_deref(), &report);
        }
        Command::ScanCommon { host, ports_file } => {
            resolve_host(&host).await?;
            let list = match ports_file {
                Some(path) => ports::load_ports_from_path(&path)?,
                None => COMMON_PORTS.to_vec(),
            };
            println!("Only scan systems you have explicit permission to test!");
            println!("\nScanning {} common ports on {host}\n", list.len());
            let report = scanner.scan_ports(&host, &list).await?;
            print_report(&report);
            write_output(cli.output.as_deref(), &report);
        }
        Command::Discover { cidr } => {
            let mut found = DiscoveryOutcome::default();
            match cidr {
                Some(cidr) => {
                    let net = discovery::parse_cidr(&cidr)?;
                    println!("Discovering hosts in {net}...");
                    found = scanner.discover_net(net).await?;
                }
                None => {
                    let cidrs = discovery::detect_local_cidrs()?;
                    if cidrs.is_empty() {
                        println!("No local IPv4 networks detected.");
                    }
                    for net in cidrs {
                        println!("Discovering hosts in {net}...");
                        found.merge(scanner.discover_net(net).await?);
                        if found.cancelled {
                            break;
                        }
                    }
                }
            }
            println!("\nDiscovered {} active hosts:", found.hosts.len());
            for host in found.hosts.iter() {
                println!("- {host}");
            }
            if found.cancelled {
                println!(
                    "Discovery interrupted after {} addresses: the host list is partial.",
                    found.probed
                );
            }
            write_output(cli.output.as_deref(), &found);
        }
    }
    Ok(())
}

/// Everything `scan` can reject, checked before any scan output is printed.
async fn check_scan_args(host: &str, start: &str, end: &str) -> Result<(u16, u16), InputError> {
    let start = ports::parse_port(start)?;
    let end = ports::parse_port(end)?;
    if start > end {
        return Err(InputError::InvalidRange { start, end });
    }
    resolve_host(host).await?;
    Ok((start, end))
}

fn print_open_port(result: &ProbeResult) {
    if result.open {
        println!(
            "[+] Port {} is OPEN ({})",
            result.port,
            result.service.as_deref().unwrap_or("Unknown")
        );
    }
}

fn print_report(report: &ScanReport) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("Scan Summary for {}", report.target);
    println!("{rule}");
    println!("Total Ports Scanned: {}", report.results.len());
    println!("Open Ports Found: {}", report.open_count);
    println!("Scan Duration: {:.2} seconds", report.duration.as_secs_f64());
    if report.cancelled {
        println!("Scan interrupted: only dispatched ports were probed.");
    }

    if report.open_count == 0 {
        println!("\nNo open ports found.");
    } else {
        print_open_table(report);
    }

    println!(
        "\nOS Detection: {}",
        report.os_guess.as_deref().unwrap_or("Unknown")
    );
    if !report.vulnerabilities.is_empty() {
        println!("\nPotential Vulnerabilities:");
        for v in &report.vulnerabilities {
            println!("- {v}");
        }
    }
    println!("{rule}");
}

fn print_open_table(report: &ScanReport) {
    let port_w = "port".len().max(5);
    let state_w = "state".len();
    let mut service_w = "service".len();
    for r in report.open_ports() {
        service_w = service_w.max(r.service.as_deref().unwrap_or("unknown").len());
    }

    println!();
    println!(
        "{:<port_w$}  {:<state_w$}  {:<service_w$}  {}",
        "port", "state", "service", "banner",
    );
    println!(
        "{:-<port_w$}  {:-<state_w$}  {:-<service_w$}  {:-<6}",
        "", "", "", "",
    );
    for r in report.open_ports() {
        println!(
            "{:<port_w$}  {:<state_w$}  {:<service_w$}  {}",
            r.port,
            "open",
            r.service.as_deref().unwrap_or("unknown"),
            banner_snippet(r.banner.as_deref().unwrap_or_default()),
        );
    }
}

/// Display-only truncation; reports keep the full banner.
fn banner_snippet(banner: &str) -> String {
    if banner.chars().count() > BANNER_DISPLAY_CHARS {
        let head: String = banner.chars().take(BANNER_DISPLAY_CHARS).collect();
        format!("{head}...")
    } else {
        banner.to_string()
    }
}

fn write_output<T: Serialize>(path: Option<&Path>, value: &T) {
    let Some(path) = path else { return };
    if let Err(e) = write_json(path, value) {
        eprintln!("Failed to write JSON to {}: {}", path.display(), e);
    } else {
        println!("Wrote JSON results to {}", path.display());
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_banners_are_cut_for_display() {
        let long = "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6 extra";
        let s = banner_snippet(long);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), BANNER_DISPLAY_CHARS + 3);
        assert_eq!(banner_snippet("220 ready"), "220 ready");
    }

    #[tokio::test]
    async fn scan_args_are_rejected_before_any_output() {
        assert!(matches!(
            check_scan_args("127.0.0.1", "30", "20").await,
            Err(InputError::InvalidRange { start: 30, end: 20 })
        ));
        assert!(matches!(
            check_scan_args("  ", "1", "10").await,
            Err(InputError::EmptyHost)
        ));
        assert!(matches!(
            check_scan_args("127.0.0.1", "0", "10").await,
            Err(InputError::InvalidPort { .. })
        ));
        assert_eq!(check_scan_args("127.0.0.1", "20", "25").await.unwrap(), (20, 25));
    }

    #[test]
    fn cli_parses_scan_subcommand() {
        let cli = Cli::try_parse_from(["netrecon", "scan", "127.0.0.1", "20", "25", "--concurrency", "5"])
            .unwrap();
        assert_eq!(cli.concurrency, 5);
        assert!(matches!(cli.command, Command::Scan { .. }));
    }
}
