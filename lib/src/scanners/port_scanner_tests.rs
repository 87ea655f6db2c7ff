use super::*;
use std::{
    net::TcpListener,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Instant,
};

use crate::scanners::ScanStatus;

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn ports(list: &[&str]) -> Arc<PortTargets> {
    PortTargets::new(list.iter().map(|p| p.to_string()).collect()).unwrap()
}

// Hand-written prober so that probes really overlap; mockall serializes
// calls into its expectations.
struct TrackingProber {
    delay: fn(u16) -> Duration,
    open: fn(u16) -> bool,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: Mutex<Vec<u16>>,
}

impl TrackingProber {
    fn new(delay: fn(u16) -> Duration, open: fn(u16) -> bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            open,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
        })
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn completed(&self) -> Vec<u16> {
        self.completed.lock().unwrap().clone()
    }
}

impl PortProber for TrackingProber {
    fn probe(&self, addr: SocketAddr, _: Protocol, _: Duration) -> bool {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        thread::sleep((self.delay)(addr.port()));

        self.completed.lock().unwrap().push(addr.port());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.open)(addr.port())
    }
}

fn closed_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[test]
fn defaults_depend_on_target_class() {
    assert_eq!(default_timeout_ms(localhost()), LOCALHOST_TIMEOUT_MS);
    assert_eq!(default_concurrency(localhost()), LOCALHOST_CONCURRENCY);

    let private = IpAddr::V4(Ipv4Addr::new(192, 168, 250, 77));
    assert_eq!(default_timeout_ms(private), LOCAL_NETWORK_TIMEOUT_MS);
    assert_eq!(default_concurrency(private), LOCAL_NETWORK_CONCURRENCY);

    let remote = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
    assert_eq!(default_timeout_ms(remote), REMOTE_TIMEOUT_MS);
    assert_eq!(default_concurrency(remote), REMOTE_CONCURRENCY);
}

#[test]
fn explicit_settings_override_defaults() {
    let scanner = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["22"]))
        .timeout_ms(300u64)
        .concurrency(3usize)
        .build()
        .unwrap();

    assert_eq!(scanner.timeout(), Duration::from_millis(300));
    assert_eq!(scanner.concurrency(), 3);
}

#[test]
fn rejects_zero_timeout_and_concurrency() {
    let res = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["22"]))
        .timeout_ms(0u64)
        .build();
    assert!(res.is_err());

    let res = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["22"]))
        .concurrency(0usize)
        .build();
    let err: NetToolsError = res.err().unwrap().into();
    assert!(matches!(err, NetToolsError::PortScannerBuild(_)));
}

#[test]
fn requires_target_and_ports() {
    assert!(PortScanner::builder().ports(ports(&["22"])).build().is_err());
    assert!(PortScanner::builder().target(localhost()).build().is_err());
}

#[test]
fn scan_one_rejects_port_zero() {
    let res =
        scan_one(localhost(), 0, Protocol::Tcp, Duration::from_millis(10));
    assert!(matches!(res, Err(NetToolsError::InvalidInput(_))));
}

#[test]
fn tcp_probe_detects_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let res =
        scan_one(localhost(), port, Protocol::Tcp, Duration::from_millis(500))
            .unwrap();

    assert!(res.open);
    assert_eq!(res.port, port);
    assert_eq!(res.protocol, Protocol::Tcp);
}

#[test]
fn tcp_probe_reports_closed_port_within_timeout() {
    let port = closed_tcp_port();
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let res = scan_one(localhost(), port, Protocol::Tcp, timeout).unwrap();

    assert!(!res.open);
    assert!(started.elapsed() < timeout + Duration::from_millis(200));
}

#[test]
fn tcp_probe_gives_up_on_unanswered_connect() {
    // TEST-NET-1 is never routed, so the handshake gets no answer. Hosts
    // without a route fail fast instead, which must also land in time.
    let target = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let res = scan_one(target, 80, Protocol::Tcp, timeout).unwrap();

    assert!(!res.open);
    assert!(started.elapsed() < timeout + Duration::from_millis(300));
}

#[test]
fn udp_probe_treats_silence_as_open() {
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = silent.local_addr().unwrap().port();

    let res =
        scan_one(localhost(), port, Protocol::Udp, Duration::from_millis(100))
            .unwrap();

    assert!(res.open);
}

#[test]
fn udp_probe_treats_reply_as_open() {
    let echo = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = echo.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let mut buf = [0u8; UDP_PROBE_SIZE];
        let (n, from) = echo.recv_from(&mut buf).unwrap();
        assert_eq!(n, UDP_PROBE_SIZE);
        echo.send_to(b"pong", from).unwrap();
    });

    let res =
        scan_one(localhost(), port, Protocol::Udp, Duration::from_millis(500))
            .unwrap();

    server.join().unwrap();
    assert!(res.open);
}

#[test]
fn udp_probe_treats_port_unreachable_as_closed() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    drop(socket);

    let res =
        scan_one(localhost(), port, Protocol::Udp, Duration::from_millis(500))
            .unwrap();

    assert!(!res.open);
}

#[test]
fn scan_returns_open_ports_sorted_despite_completion_order() {
    // higher ports finish first
    let prober = TrackingProber::new(
        |port| Duration::from_millis(10 * (25 - port as u64)),
        |port| port % 2 == 0,
    );

    let (tx, rx) = mpsc::channel();

    let scanner = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["1-20"]))
        .concurrency(20usize)
        .notifier(tx)
        .prober(Arc::clone(&prober) as Arc<dyn PortProber>)
        .build()
        .unwrap();

    let handle = scanner.scan().unwrap();
    drop(scanner);

    let open = handle.join().unwrap();
    assert_eq!(open, vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);

    assert!(prober.peak() > 1);
    assert!(prober.peak() <= 20);

    let completed = prober.completed();
    assert_eq!(completed.len(), 20);
    assert!(completed[0] > completed[19]);

    let messages: Vec<ScanMessage> = rx.iter().collect();

    let results: Vec<u16> = messages
        .iter()
        .filter_map(|m| match m {
            ScanMessage::PortResult(r) => Some(r.port),
            _ => None,
        })
        .collect();

    // completion order, not port order
    assert_eq!(results, completed);

    match messages.last() {
        Some(ScanMessage::PortsDone(done)) => assert_eq!(done, &open),
        other => panic!("expected PortsDone, got {:?}", other),
    }
}

#[test]
fn scan_never_exceeds_concurrency() {
    let prober =
        TrackingProber::new(|_| Duration::from_millis(15), |_| true);

    let open = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["1-24"]))
        .concurrency(3usize)
        .prober(Arc::clone(&prober) as Arc<dyn PortProber>)
        .build()
        .unwrap()
        .scan()
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(open, (1..=24).collect::<Vec<u16>>());
    assert!(prober.peak() > 1);
    assert!(prober.peak() <= 3);
}

#[test]
fn scan_probes_duplicate_ports_once() {
    let mut prober = MockPortProber::new();
    prober.expect_probe().times(2).returning(|_, _, _| true);
    let prober: Arc<dyn PortProber> = Arc::new(prober);

    let open = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["22", "22", "21-22"]))
        .prober(prober)
        .build()
        .unwrap()
        .scan()
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(open, vec![21, 22]);
}

#[test]
fn scan_passes_protocol_and_timeout_to_prober() {
    let mut prober = MockPortProber::new();
    prober
        .expect_probe()
        .withf(|addr, protocol, timeout| {
            addr.port() == 53
                && *protocol == Protocol::Udp
                && *timeout == Duration::from_millis(42)
        })
        .times(1)
        .returning(|_, _, _| false);
    let prober: Arc<dyn PortProber> = Arc::new(prober);

    let open = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["53"]))
        .protocol(Protocol::Udp)
        .timeout_ms(42u64)
        .prober(prober)
        .build()
        .unwrap()
        .scan()
        .unwrap()
        .join()
        .unwrap();

    assert!(open.is_empty());
}

#[test]
fn no_results_are_delivered_after_cancel() {
    let prober =
        TrackingProber::new(|_| Duration::from_millis(20), |_| true);

    let (tx, rx) = mpsc::channel();

    let scanner = PortScanner::builder()
        .target(localhost())
        .ports(ports(&["1-1000"]))
        .concurrency(4usize)
        .notifier(tx)
        .prober(Arc::clone(&prober) as Arc<dyn PortProber>)
        .build()
        .unwrap();

    let handle = scanner.scan().unwrap();
    drop(scanner);

    thread::sleep(Duration::from_millis(100));
    handle.cancel();

    let before: Vec<ScanMessage> = rx.try_iter().collect();
    let state = handle.state();
    let open = handle.join().unwrap();
    let after: Vec<ScanMessage> = rx.iter().collect();

    assert_eq!(state.status(), ScanStatus::Cancelled);
    assert!(prober.completed().len() < 1000);
    assert!(prober.peak() > 1);
    assert!(prober.peak() <= 4);

    let delivered: Vec<u16> = before
        .iter()
        .filter_map(|m| match m {
            ScanMessage::PortResult(r) => Some(r.port),
            _ => None,
        })
        .sorted()
        .collect();

    assert!(!delivered.is_empty());
    assert_eq!(open, delivered);

    assert_eq!(after.len(), 1);
    match &after[0] {
        ScanMessage::PortsDone(done) => assert_eq!(done, &open),
        other => panic!("expected PortsDone, got {:?}", other),
    }
}

#[test]
fn scan_without_notifier_still_returns_result() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let open_port = listener.local_addr().unwrap().port();
    let closed_port = closed_tcp_port();

    let targets = PortTargets::new(vec![
        open_port.to_string(),
        closed_port.to_string(),
    ])
    .unwrap();

    let open = PortScanner::builder()
        .target(localhost())
        .ports(targets)
        .timeout_ms(200u64)
        .build()
        .unwrap()
        .scan()
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(open, vec![open_port]);
}

#[test]
fn names_well_known_services() {
    assert_eq!(well_known_service(22), Some("ssh"));
    assert_eq!(well_known_service(443), Some("https"));
    assert_eq!(well_known_service(40000), None);
}
