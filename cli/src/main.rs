//! CLI for local network diagnostics: ping, port scanning, neighbor cache
//! lookups and subnet device discovery
//!
//! # Examples
//!
//! ```bash
//! # help menu
//! r-nettools --help
//!
//! # ping a host 5 times
//! r-nettools ping 192.168.1.1 -c 5
//!
//! # scan ports on a host
//! r-nettools ports 192.168.1.1 -p 22,80,443,8000-9000
//!
//! # discover devices on the local /24
//! r-nettools subnet
//!
//! # print the neighbor cache
//! r-nettools arp
//! ```
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use itertools::Itertools;
use log::*;
use r_nettools::{
    neighbors::{AddressRecord, AddressResolver, parse_mac},
    network,
    ping::{PingAggregate, PingOptions, PingSeries},
    scanners::{
        PortProbeResult, Protocol, ScanHandle, ScanMessage, ScanState, Scanner,
        SubnetDevice,
        port_scanner::{self, PortScanner},
        subnet_scanner::SubnetScanner,
    },
    targets::{ips::IPTargets, ports::PortTargets},
};
use serde::Serialize;
use std::{
    net::IpAddr,
    path::PathBuf,
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    time::{Duration, Instant},
};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// CLI for local network diagnostics
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output final report in json instead of table text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Only print final output nothing else
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    /// Prints debug logs including those from r-nettools
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// Path to a YAML file of defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ping a host and print round trip statistics
    Ping {
        /// IP address or host name to ping
        target: String,

        /// Number of attempts
        #[arg(short, long)]
        count: Option<u32>,

        /// Per-attempt timeout in milliseconds (minimum 1000)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Time to live of each echo request
        #[arg(long)]
        ttl: Option<u8>,
    },

    /// Scan a host for open ports
    Ports {
        /// IP address or host name to scan
        target: String,

        /// Comma separated list of ports and port ranges to scan
        #[arg(short, long, use_value_delimiter = true)]
        ports: Vec<String>,

        /// Probe with UDP instead of TCP connect
        #[arg(long, default_value_t = false)]
        udp: bool,

        /// Per-port timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Number of ports probed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Discover live devices on the local subnet
    Subnet {
        /// Comma separated list of IPs, IP ranges, and CIDR blocks to scan
        /// instead of the local /24
        #[arg(short, long, use_value_delimiter = true)]
        targets: Vec<String>,

        /// Per-host ping timeout in milliseconds (minimum 1000)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Number of hosts probed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the neighbor cache or look up a single entry
    Arp {
        /// Look up the MAC address of this IP
        #[arg(long, conflicts_with = "mac")]
        ip: Option<String>,

        /// Look up the IP address of this MAC
        #[arg(long)]
        mac: Option<String>,
    },
}

#[derive(Serialize)]
#[doc(hidden)]
struct PortReport<'a> {
    target: IpAddr,
    protocol: Protocol,
    open_ports: &'a [u16],
}

#[doc(hidden)]
fn initialize_logger(args: &Args) -> Result<()> {
    let filter = if args.quiet {
        simplelog::LevelFilter::Error
    } else if args.debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    simplelog::TermLogger::init(
        filter,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

#[doc(hidden)]
fn load_config(args: &Args) -> Config {
    match args.config.clone().or_else(config::get_project_config_path) {
        Some(path) => Config::load(&path),
        None => Config::default(),
    }
}

#[doc(hidden)]
fn cancel_on_ctrl_c(state: Arc<ScanState>) {
    let res = ctrlc::set_handler(move || {
        if state.cancel() {
            warn!("cancelling scan...");
        }
    });

    if let Err(e) = res {
        warn!("failed to set ctrl-c handler: {}", e);
    }
}

/// How often the message loops check whether the scan thread has exited
const MESSAGE_POLL: Duration = Duration::from_millis(100);

#[doc(hidden)]
/// Returns the next message of a running scan, or None once the scan thread
/// has exited and nothing is left to read. The caller then joins the handle
/// to surface the scan's own error.
fn next_message<T>(
    rx: &Receiver<ScanMessage>,
    handle: &ScanHandle<T>,
) -> Option<ScanMessage> {
    loop {
        match rx.recv_timeout(MESSAGE_POLL) {
            Ok(msg) => return Some(msg),
            Err(RecvTimeoutError::Disconnected) => return None,
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => {
                return rx.try_recv().ok();
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

#[doc(hidden)]
fn process_ping(
    scanner: &dyn Scanner<Output = PingAggregate>,
    rx: Receiver<ScanMessage>,
    on_start: &dyn Fn(Arc<ScanState>),
) -> Result<PingAggregate> {
    let handle = scanner.scan()?;

    on_start(handle.state());

    loop {
        let Some(msg) = next_message(&rx, &handle) else {
            break;
        };

        match msg {
            ScanMessage::PingDone(_) => {
                debug!("ping series complete");
                break;
            }
            ScanMessage::PingResult(outcome) => match outcome.latency_ms {
                Some(ms) => {
                    info!("reply from {}: time={:.3} ms", outcome.target, ms)
                }
                None => info!(
                    "no reply from {}: {}",
                    outcome.target,
                    outcome.error.unwrap_or_default()
                ),
            },
            ScanMessage::Error(e) => warn!("{}", e),
            _ => {}
        }
    }

    Ok(handle.join()?)
}

#[doc(hidden)]
fn print_ping(args: &Args, aggregate: &PingAggregate) -> Result<()> {
    if args.json {
        let j: String = serde_json::to_string(aggregate)?;
        println!("{}", j);
    } else {
        println!("{}", aggregate);
    }

    Ok(())
}

#[doc(hidden)]
fn process_ports(
    scanner: &dyn Scanner<Output = Vec<u16>>,
    rx: Receiver<ScanMessage>,
    on_start: &dyn Fn(Arc<ScanState>),
) -> Result<Vec<u16>> {
    let handle = scanner.scan()?;

    on_start(handle.state());

    loop {
        let Some(msg) = next_message(&rx, &handle) else {
            break;
        };

        match msg {
            ScanMessage::PortsDone(_) => {
                debug!("port scan complete");
                break;
            }
            ScanMessage::PortResult(PortProbeResult { port, open, .. }) => {
                if open {
                    info!("found open port: {}", port);
                }
            }
            ScanMessage::Error(e) => warn!("{}", e),
            _ => {}
        }
    }

    Ok(handle.join()?)
}

#[doc(hidden)]
fn print_ports(
    args: &Args,
    target: IpAddr,
    protocol: Protocol,
    open_ports: &[u16],
) -> Result<()> {
    if args.json {
        let j: String = serde_json::to_string(&PortReport {
            target,
            protocol,
            open_ports,
        })?;
        println!("{}", j);
    } else {
        let mut port_table = prettytable::Table::new();

        port_table.add_row(prettytable::row!["PORT", "PROTOCOL", "SERVICE"]);

        for port in open_ports {
            port_table.add_row(prettytable::row![
                port,
                protocol,
                port_scanner::well_known_service(*port).unwrap_or("")
            ]);
        }

        port_table.printstd();
    }

    Ok(())
}

#[doc(hidden)]
fn process_subnet(
    scanner: &dyn Scanner<Output = Vec<SubnetDevice>>,
    rx: Receiver<ScanMessage>,
    on_start: &dyn Fn(Arc<ScanState>),
) -> Result<Vec<SubnetDevice>> {
    let handle = scanner.scan()?;

    on_start(handle.state());

    loop {
        let Some(msg) = next_message(&rx, &handle) else {
            break;
        };

        match msg {
            ScanMessage::DevicesDone(_) => {
                debug!("subnet scan complete");
                break;
            }
            ScanMessage::DeviceFound(d) => {
                info!("found device: {}", d.ip);
            }
            ScanMessage::Error(e) => warn!("{}", e),
            _ => {}
        }
    }

    Ok(handle.join()?)
}

#[doc(hidden)]
fn print_devices(args: &Args, devices: &[SubnetDevice]) -> Result<()> {
    if args.json {
        let j: String = serde_json::to_string(devices)?;
        println!("{}", j);
    } else {
        let mut device_table = prettytable::Table::new();

        device_table.add_row(prettytable::row![
            "IP", "HOSTNAME", "MAC", "VENDOR", "LATENCY"
        ]);

        for d in devices.iter().sorted() {
            let ip_field = if d.is_current_host {
                format!("{} [YOU]", d.ip)
            } else {
                d.ip.to_string()
            };

            device_table.add_row(prettytable::row![
                ip_field,
                d.hostname.as_deref().unwrap_or(""),
                d.mac.map(|m| m.to_string()).unwrap_or_default(),
                d.vendor.as_deref().unwrap_or(""),
                format!("{:.3} ms", d.latency_ms)
            ]);
        }

        device_table.printstd();
    }

    Ok(())
}

#[doc(hidden)]
fn print_neighbors(args: &Args, records: &[AddressRecord]) -> Result<()> {
    if args.json {
        let j: String = serde_json::to_string(records)?;
        println!("{}", j);
    } else {
        let mut arp_table = prettytable::Table::new();

        arp_table.add_row(prettytable::row!["IP", "MAC"]);

        for r in records {
            arp_table.add_row(prettytable::row![r.ip, r.mac]);
        }

        arp_table.printstd();
    }

    Ok(())
}

#[doc(hidden)]
fn run_ping(
    args: &Args,
    config: &Config,
    target: &str,
    count: Option<u32>,
    timeout_ms: Option<u64>,
    ttl: Option<u8>,
) -> Result<()> {
    let ip = network::resolve_target(target)?;

    let options = PingOptions::default()
        .with_timeout_ms(timeout_ms.unwrap_or(config.ping_timeout_ms))
        .with_ttl(ttl.unwrap_or(config.ttl));

    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let series = PingSeries::builder()
        .target(ip)
        .options(options)
        .count(count.unwrap_or(config.ping_count))
        .notifier(tx)
        .build()?;

    info!("pinging {} ({})", target, ip);

    let aggregate = process_ping(&series, rx, &cancel_on_ctrl_c)?;

    print_ping(args, &aggregate)
}

#[doc(hidden)]
fn run_ports(
    args: &Args,
    config: &Config,
    target: &str,
    ports: &[String],
    udp: bool,
    timeout_ms: Option<u64>,
    concurrency: Option<usize>,
) -> Result<()> {
    let ip = network::resolve_target(target)?;

    let ports = if ports.is_empty() {
        config.ports.clone()
    } else {
        ports.to_vec()
    };

    let port_targets = PortTargets::new(ports)
        .map_err(|e| eyre!("Invalid port targets: {}", e))?;

    let protocol = if udp { Protocol::Udp } else { Protocol::Tcp };

    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let mut builder = PortScanner::builder();

    builder
        .target(ip)
        .ports(port_targets)
        .protocol(protocol)
        .notifier(tx);

    if let Some(timeout_ms) = timeout_ms.or(config.port_timeout_ms) {
        builder.timeout_ms(timeout_ms);
    }

    if let Some(concurrency) = concurrency.or(config.port_concurrency) {
        builder.concurrency(concurrency);
    }

    let scanner = builder.build()?;

    info!(
        "scanning {} ({}) over {} with {} workers, {:?} timeout",
        target,
        ip,
        protocol,
        scanner.concurrency(),
        scanner.timeout()
    );

    let started = Instant::now();
    let open_ports = process_ports(&scanner, rx, &cancel_on_ctrl_c)?;

    info!(
        "port scan finished in {}",
        humantime::format_duration(started.elapsed())
    );

    print_ports(args, ip, protocol, &open_ports)
}

#[doc(hidden)]
fn run_subnet(
    args: &Args,
    config: &Config,
    targets: &[String],
    timeout_ms: Option<u64>,
    concurrency: Option<usize>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let mut builder = SubnetScanner::builder();

    builder
        .ping_options(PingOptions::default().with_timeout_ms(
            timeout_ms.unwrap_or(config.subnet_timeout_ms),
        ))
        .concurrency(concurrency.unwrap_or(config.subnet_concurrency))
        .notifier(tx);

    if !targets.is_empty() {
        builder.targets(
            IPTargets::new(targets.to_vec())
                .map_err(|e| eyre!("Invalid IP targets: {}", e))?,
        );
    }

    let scanner = builder.build()?;

    info!("discovering devices on {} hosts", scanner.targets()?.len());

    let started = Instant::now();
    let devices = process_subnet(&scanner, rx, &cancel_on_ctrl_c)?;

    info!(
        "subnet scan finished in {}",
        humantime::format_duration(started.elapsed())
    );

    print_devices(args, &devices)
}

#[doc(hidden)]
fn run_arp(args: &Args, ip: Option<&str>, mac: Option<&str>) -> Result<()> {
    let resolver = AddressResolver::default();

    if let Some(ip) = ip {
        let ip: IpAddr = ip
            .parse()
            .map_err(|e| eyre!("invalid IP address {}: {}", ip, e))?;

        let records = resolver
            .resolve_mac(ip)
            .map(|mac| vec![AddressRecord { ip, mac }])
            .unwrap_or_default();

        if records.is_empty() {
            warn!("{} not found in neighbor cache", ip);
        }

        return print_neighbors(args, &records);
    }

    if let Some(mac) = mac {
        let records = match (resolver.resolve_ip(mac)?, parse_mac(mac)) {
            (Some(ip), Some(mac)) => vec![AddressRecord { ip, mac }],
            _ => vec![],
        };

        if records.is_empty() {
            warn!("{} not found in neighbor cache", mac);
        }

        return print_neighbors(args, &records);
    }

    print_neighbors(args, &resolver.neighbor_table().to_sorted_records())
}

#[doc(hidden)]
fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    initialize_logger(&args)?;

    let config = load_config(&args);

    debug!("configuration: {:?}", config);

    match &args.command {
        Command::Ping {
            target,
            count,
            timeout_ms,
            ttl,
        } => run_ping(&args, &config, target, *count, *timeout_ms, *ttl),
        Command::Ports {
            target,
            ports,
            udp,
            timeout_ms,
            concurrency,
        } => run_ports(
            &args,
            &config,
            target,
            ports,
            *udp,
            *timeout_ms,
            *concurrency,
        ),
        Command::Subnet {
            targets,
            timeout_ms,
            concurrency,
        } => run_subnet(&args, &config, targets, *timeout_ms, *concurrency),
        Command::Arp { ip, mac } => {
            run_arp(&args, ip.as_deref(), mac.as_deref())
        }
    }
}

#[cfg(test)]
#[path = "./main_tests.rs"]
mod tests;
