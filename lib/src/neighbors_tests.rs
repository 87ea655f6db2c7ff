use std::io::Write;

use super::*;

const ARP_TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.18.11    0x1         0x2         00:04:20:06:55:1a     *        eth0
192.168.18.36    0x1         0x2         00:22:43:ab:2a:5b     *        eth0
192.168.18.40    0x1         0x0         00:00:00:00:00:00     *        eth0
192.168.18.41    0x1         0x2         not-a-mac             *        eth0
192.168.18.42    0x1
";

const NEIGHBOR_OUTPUT: &str = "\
192.168.18.36 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE
192.168.18.50 dev eth0 lladdr 11:22:33:44:55:66 STALE
192.168.18.51 dev eth0 FAILED
fe80::1 dev eth0 lladdr 11:22:33:44:55:77 router STALE
192.168.18.52 dev eth0 lladdr 00:00:00:00:00:00 STALE
";

fn ip(s: &str) -> IpAddr {
    IpAddr::from_str(s).unwrap()
}

fn mac(s: &str) -> MacAddr {
    MacAddr::from_str(s).unwrap()
}

fn mock_source(
    arp: Option<&'static str>,
    neigh: Option<&'static str>,
) -> MockNeighborSource {
    let mut source = MockNeighborSource::new();
    source
        .expect_arp_table()
        .returning(move || arp.map(String::from));
    source
        .expect_neighbor_command()
        .returning(move || neigh.map(String::from));
    source
}

#[test]
fn parses_strict_mac_addresses() {
    assert_eq!(parse_mac("00:22:43:ab:2a:5b"), Some(mac("00:22:43:ab:2a:5b")));
    assert_eq!(parse_mac("00:22:43:AB:2A:5B"), Some(mac("00:22:43:ab:2a:5b")));
    assert_eq!(parse_mac("0:22:43:ab:2a:5b"), None);
    assert_eq!(parse_mac("00:22:43:ab:2a"), None);
    assert_eq!(parse_mac("00-22-43-ab-2a-5b"), None);
    assert_eq!(parse_mac("zz:22:43:ab:2a:5b"), None);
    assert_eq!(parse_mac(""), None);
}

#[test]
fn parses_arp_table_skipping_malformed_lines() {
    let records = parse_arp_table(ARP_TABLE);

    assert_eq!(
        records,
        vec![
            AddressRecord {
                ip: ip("192.168.18.11"),
                mac: mac("00:04:20:06:55:1a"),
            },
            AddressRecord {
                ip: ip("192.168.18.36"),
                mac: mac("00:22:43:ab:2a:5b"),
            },
        ]
    );
}

#[test]
fn parses_neighbor_output_skipping_short_lines() {
    let records = parse_neighbor_output(NEIGHBOR_OUTPUT);

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].ip, ip("192.168.18.36"));
    assert_eq!(records[0].mac, mac("aa:bb:cc:dd:ee:ff"));
    assert_eq!(records[1].ip, ip("192.168.18.50"));
    assert_eq!(records[2].ip, ip("fe80::1"));
}

#[test]
fn command_entries_take_precedence_over_arp_file() {
    let resolver = AddressResolver::new(Arc::new(mock_source(
        Some(ARP_TABLE),
        Some(NEIGHBOR_OUTPUT),
    )));

    let table = resolver.neighbor_table();

    // present in both sources, command wins
    assert_eq!(
        table.mac_for(ip("192.168.18.36")),
        Some(mac("aa:bb:cc:dd:ee:ff"))
    );
    // only in the arp file
    assert_eq!(
        table.mac_for(ip("192.168.18.11")),
        Some(mac("00:04:20:06:55:1a"))
    );
    // only in the command output
    assert_eq!(
        table.mac_for(ip("192.168.18.50")),
        Some(mac("11:22:33:44:55:66"))
    );
    assert_eq!(table.len(), 4);
}

#[test]
fn merged_table_never_contains_zero_mac() {
    let resolver = AddressResolver::new(Arc::new(mock_source(
        Some(ARP_TABLE),
        Some(NEIGHBOR_OUTPUT),
    )));

    let table = resolver.neighbor_table();

    assert!(table.0.values().all(|m| *m != MacAddr::zero()));
    assert_eq!(table.mac_for(ip("192.168.18.40")), None);
    assert_eq!(table.mac_for(ip("192.168.18.52")), None);
}

#[test]
fn unreadable_sources_yield_empty_table() {
    let resolver = AddressResolver::new(Arc::new(mock_source(None, None)));
    assert!(resolver.neighbor_table().is_empty());
    assert_eq!(resolver.resolve_mac(ip("192.168.18.11")), None);
}

#[test]
fn resolves_mac_from_ip() {
    let resolver =
        AddressResolver::new(Arc::new(mock_source(Some(ARP_TABLE), None)));

    assert_eq!(
        resolver.resolve_mac(ip("192.168.18.11")),
        Some(mac("00:04:20:06:55:1a"))
    );
    assert_eq!(resolver.resolve_mac(ip("192.168.18.99")), None);
}

#[test]
fn resolves_ip_from_mac_ignoring_case() {
    let resolver =
        AddressResolver::new(Arc::new(mock_source(Some(ARP_TABLE), None)));

    assert_eq!(
        resolver.resolve_ip("00:22:43:AB:2A:5B").unwrap(),
        Some(ip("192.168.18.36"))
    );
    assert_eq!(resolver.resolve_ip("00:22:43:ab:2a:5c").unwrap(), None);
}

#[test]
fn rejects_malformed_mac_before_reading_sources() {
    let mut source = MockNeighborSource::new();
    source.expect_arp_table().never();
    source.expect_neighbor_command().never();

    let resolver = AddressResolver::new(Arc::new(source));

    let res = resolver.resolve_ip("00:22:43:ab:2a");
    assert!(matches!(res, Err(NetToolsError::InvalidInput(_))));
}

#[test]
fn lists_all_ips_and_macs_sorted_by_ip() {
    let resolver =
        AddressResolver::new(Arc::new(mock_source(Some(ARP_TABLE), None)));

    assert_eq!(
        resolver.all_ips(),
        vec![ip("192.168.18.11"), ip("192.168.18.36")]
    );
    assert_eq!(
        resolver.all_macs(),
        vec![mac("00:04:20:06:55:1a"), mac("00:22:43:ab:2a:5b")]
    );
}

#[test]
fn system_source_reads_arp_file_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(ARP_TABLE.as_bytes()).unwrap();

    let source = SystemNeighbors::with_arp_path(file.path());

    assert_eq!(source.arp_table().as_deref(), Some(ARP_TABLE));
}

#[test]
fn system_source_returns_none_for_missing_arp_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = SystemNeighbors::with_arp_path(dir.path().join("missing"));

    assert_eq!(source.arp_table(), None);
}
