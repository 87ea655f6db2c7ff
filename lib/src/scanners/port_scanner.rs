//! Provides Scanner implementation for TCP connect and UDP port scanning

#[cfg(test)]
use mockall::automock;

use derive_builder::Builder;
use itertools::Itertools;
use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket},
    sync::{Arc, LazyLock, Mutex, PoisonError, mpsc},
    time::Duration,
};
use threadpool::ThreadPool;

use crate::{
    error::{NetToolsError, Result},
    network,
    scanners::{
        PortProbeResult, Protocol, ScanHandle, ScanMessage, ScanState,
        Scanner, Scanning, notify,
    },
    targets::ports::PortTargets,
};

/// Size of the datagram sent by a UDP probe
pub const UDP_PROBE_SIZE: usize = 128;

/// Default probe timeout for loopback / locally bound targets
pub const LOCALHOST_TIMEOUT_MS: u64 = 25;
/// Default worker count for loopback / locally bound targets
pub const LOCALHOST_CONCURRENCY: usize = 7;
/// Default probe timeout for private network targets
pub const LOCAL_NETWORK_TIMEOUT_MS: u64 = 1000;
/// Default worker count for private network targets
pub const LOCAL_NETWORK_CONCURRENCY: usize = 50;
/// Default probe timeout for every other target
pub const REMOTE_TIMEOUT_MS: u64 = 2500;
/// Default worker count for every other target
pub const REMOTE_CONCURRENCY: usize = 50;

static SERVICES: LazyLock<HashMap<u16, &str>> = LazyLock::new(|| {
    HashMap::from([
        (20, "ftp-data"),
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "dns"),
        (67, "dhcp"),
        (80, "http"),
        (110, "pop3"),
        (123, "ntp"),
        (143, "imap"),
        (161, "snmp"),
        (443, "https"),
        (445, "microsoft-ds"),
        (587, "submission"),
        (631, "ipp"),
        (993, "imaps"),
        (995, "pop3s"),
        (1900, "ssdp"),
        (3306, "mysql"),
        (3389, "rdp"),
        (5353, "mdns"),
        (5432, "postgresql"),
        (5900, "vnc"),
        (6379, "redis"),
        (8080, "http-alt"),
        (8443, "https-alt"),
    ])
});

/// Returns the conventional service name for a well known port
pub fn well_known_service(port: u16) -> Option<&'static str> {
    SERVICES.get(&port).copied()
}

/// Returns the default probe timeout for `target`: short for the local host,
/// longer for private networks and longest for anything else
pub fn default_timeout_ms(target: IpAddr) -> u64 {
    if network::is_localhost(target) {
        LOCALHOST_TIMEOUT_MS
    } else if network::is_local_network(target) {
        LOCAL_NETWORK_TIMEOUT_MS
    } else {
        REMOTE_TIMEOUT_MS
    }
}

/// Returns the default worker count for `target`
pub fn default_concurrency(target: IpAddr) -> usize {
    if network::is_localhost(target) {
        LOCALHOST_CONCURRENCY
    } else if network::is_local_network(target) {
        LOCAL_NETWORK_CONCURRENCY
    } else {
        REMOTE_CONCURRENCY
    }
}

#[cfg_attr(test, automock)]
/// Trait describing a single port probe
pub trait PortProber: Send + Sync {
    /// Should return true if `addr` is judged open for `protocol`. Must not
    /// block much longer than `timeout`.
    fn probe(&self, addr: SocketAddr, protocol: Protocol, timeout: Duration)
    -> bool;
}

/// [`PortProber`] using plain OS sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketProber;

impl SocketProber {
    fn probe_tcp(addr: SocketAddr, timeout: Duration) -> bool {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("tcp {} closed: {}", addr, e);
                false
            }
        }
    }

    fn probe_udp(addr: SocketAddr, timeout: Duration) -> bool {
        let bind_addr = if addr.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let exchange = || -> std::io::Result<usize> {
            let socket = UdpSocket::bind(bind_addr)?;
            socket.set_read_timeout(Some(timeout))?;
            socket.set_write_timeout(Some(timeout))?;
            socket.connect(addr)?;
            socket.send(&[0u8; UDP_PROBE_SIZE])?;
            let mut buf = [0u8; UDP_PROBE_SIZE];
            socket.recv(&mut buf)
        };

        match exchange() {
            Ok(_) => true,
            // no port unreachable came back before the timeout
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                true
            }
            Err(e) => {
                log::debug!("udp {} closed: {}", addr, e);
                false
            }
        }
    }
}

impl PortProber for SocketProber {
    fn probe(
        &self,
        addr: SocketAddr,
        protocol: Protocol,
        timeout: Duration,
    ) -> bool {
        match protocol {
            Protocol::Tcp => Self::probe_tcp(addr, timeout),
            Protocol::Udp => Self::probe_udp(addr, timeout),
        }
    }
}

/// Probes a single port synchronously
///
/// # Errors
///
/// Returns [`NetToolsError::InvalidInput`] for port 0 or a zero timeout
pub fn scan_one(
    target: IpAddr,
    port: u16,
    protocol: Protocol,
    timeout: Duration,
) -> Result<PortProbeResult> {
    if port == 0 {
        return Err(NetToolsError::InvalidInput(
            "port must be between 1 and 65535".into(),
        ));
    }

    if timeout.is_zero() {
        return Err(NetToolsError::InvalidInput(
            "timeout must be at least 1ms".into(),
        ));
    }

    let addr = SocketAddr::new(target, port);
    let open = SocketProber.probe(addr, protocol, timeout);

    Ok(PortProbeResult {
        port,
        protocol,
        open,
    })
}

/// Data structure representing a port scanner for a single target
#[derive(Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct PortScanner {
    /// Address to scan
    target: IpAddr,
    /// Ports to probe
    ports: Arc<PortTargets>,
    /// Protocol used for every probe
    #[builder(default)]
    protocol: Protocol,
    /// Per-probe timeout, defaults by target class
    #[builder(default, setter(into, strip_option))]
    timeout_ms: Option<u64>,
    /// Worker count, defaults by target class
    #[builder(default, setter(into, strip_option))]
    concurrency: Option<usize>,
    /// Channel for sending scan results and status messages
    #[builder(default, setter(into, strip_option))]
    notifier: Option<mpsc::Sender<ScanMessage>>,
    /// Probe used for each port
    #[builder(default = "Arc::new(SocketProber) as Arc<dyn PortProber>")]
    prober: Arc<dyn PortProber>,
}

impl PortScannerBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(Some(0)) = self.timeout_ms {
            return Err("timeout must be at least 1ms".into());
        }
        if let Some(Some(0)) = self.concurrency {
            return Err("concurrency must be at least 1".into());
        }
        Ok(())
    }
}

impl PortScanner {
    /// Returns builder for PortScanner
    pub fn builder() -> PortScannerBuilder {
        PortScannerBuilder::default()
    }

    /// Returns the per-probe timeout that will be used
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(
            self.timeout_ms
                .unwrap_or_else(|| default_timeout_ms(self.target)),
        )
    }

    /// Returns the worker count that will be used
    pub fn concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| default_concurrency(self.target))
    }

    fn probe_port(
        &self,
        port: u16,
        timeout: Duration,
        state: &ScanState,
        open: &Mutex<Vec<u16>>,
    ) -> Result<()> {
        let started = state
            .while_running(|| {
                notify(
                    &self.notifier,
                    ScanMessage::Info(Scanning {
                        ip: self.target,
                        port: Some(port),
                    }),
                )
            })
            .transpose()?;

        if started.is_none() {
            return Ok(());
        }

        let addr = SocketAddr::new(self.target, port);
        let is_open = self.prober.probe(addr, self.protocol, timeout);

        state
            .while_running(|| {
                if is_open {
                    open.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(port);
                }
                notify(
                    &self.notifier,
                    ScanMessage::PortResult(PortProbeResult {
                        port,
                        protocol: self.protocol,
                        open: is_open,
                    }),
                )
            })
            .transpose()?;

        Ok(())
    }

    fn run(&self, state: Arc<ScanState>) -> Result<Vec<u16>> {
        let timeout = self.timeout();
        let concurrency = self.concurrency();

        log::debug!(
            "scanning {} {} ports on {} (timeout {:?}, concurrency {})",
            self.ports.len(),
            self.protocol,
            self.target,
            timeout,
            concurrency
        );

        let pool = ThreadPool::new(concurrency);
        let open = Arc::new(Mutex::new(Vec::new()));
        let (err_tx, err_rx) = mpsc::channel::<NetToolsError>();
        let mut seen = HashSet::new();

        self.ports.lazy_loop(|port| {
            if !state.is_running() || !seen.insert(port) {
                return Ok(());
            }

            let scanner = self.clone();
            let state = Arc::clone(&state);
            let open = Arc::clone(&open);
            let err_tx = err_tx.clone();

            pool.execute(move || {
                if let Err(e) = scanner.probe_port(port, timeout, &state, &open)
                {
                    let _ = err_tx.send(e);
                }
            });

            Ok(())
        })?;

        pool.join();

        if pool.panic_count() > 0 {
            log::error!("{} port probe workers panicked", pool.panic_count());
            notify(
                &self.notifier,
                ScanMessage::Error(format!(
                    "{} port probe workers panicked",
                    pool.panic_count()
                )),
            )?;
        }

        if let Ok(e) = err_rx.try_recv() {
            return Err(e);
        }

        let status = state.finish();

        let open_ports: Vec<u16> = open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .sorted()
            .dedup()
            .collect();

        log::debug!(
            "port scan on {} {:?}: {} open",
            self.target,
            status,
            open_ports.len()
        );

        notify(&self.notifier, ScanMessage::PortsDone(open_ports.clone()))?;

        Ok(open_ports)
    }
}

impl Scanner for PortScanner {
    type Output = Vec<u16>;

    fn scan(&self) -> Result<ScanHandle<Vec<u16>>> {
        let scanner = self.clone();
        Ok(ScanHandle::spawn(move |state| scanner.run(state)))
    }
}

#[cfg(test)]
#[path = "./port_scanner_tests.rs"]
mod tests;
