//! Provides IP <-> MAC resolution from the kernel neighbor cache
//!
//! Two sources are consulted:
//!
//! 1. the live `ip neigh show` command, which is treated as authoritative
//! 2. the `/proc/net/arp` pseudo-file, which only fills in addresses the
//!    command did not report
//!
//! Both are loosely structured text; malformed lines are skipped rather than
//! treated as errors, and an unreadable source simply contributes nothing.

#[cfg(test)]
use mockall::automock;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    net::IpAddr,
    path::PathBuf,
    process::Command,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use crate::{
    error::{NetToolsError, Result},
    process::{self, ProcessExit},
    serde_display,
};

/// Location of the kernel ARP table pseudo-file
pub const PROC_NET_ARP: &str = "/proc/net/arp";
/// Program used to list the live neighbor cache
pub const NEIGHBOR_PROGRAM: &str = "ip";
/// Arguments passed to [`NEIGHBOR_PROGRAM`]
pub const NEIGHBOR_ARGS: [&str; 2] = ["neigh", "show"];
/// Upper bound on how long the neighbor command may run
pub const NEIGHBOR_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Column holding the IP address in `/proc/net/arp`
pub const ARP_IP_COLUMN: usize = 0;
/// Column holding the MAC address in `/proc/net/arp`
pub const ARP_MAC_COLUMN: usize = 3;
/// Column holding the IP address in `ip neigh` output
pub const NEIGHBOR_IP_COLUMN: usize = 0;
/// Column holding the MAC address in `ip neigh` output
/// (`<ip> dev <iface> lladdr <mac> ...`)
pub const NEIGHBOR_MAC_COLUMN: usize = 4;

/// A single neighbor cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRecord {
    /// IP address of the neighbor
    pub ip: IpAddr,
    /// Link layer address of the neighbor
    #[serde(
        serialize_with = "serde_display::serialize",
        deserialize_with = "serde_display::deserialize"
    )]
    pub mac: MacAddr,
}

/// Parses a MAC address in the strict `aa:bb:cc:dd:ee:ff` form: exactly six
/// colon separated pairs of hex digits, either case
pub fn parse_mac(mac: &str) -> Option<MacAddr> {
    let octets: Vec<&str> = mac.split(':').collect();

    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if !well_formed {
        return None;
    }

    MacAddr::from_str(mac).ok()
}

fn record_from_columns(
    columns: &[&str],
    ip_column: usize,
    mac_column: usize,
) -> Option<AddressRecord> {
    let ip = IpAddr::from_str(columns.get(ip_column)?).ok()?;
    let mac = parse_mac(columns.get(mac_column)?)?;

    if mac == MacAddr::zero() {
        return None;
    }

    Some(AddressRecord { ip, mac })
}

/// Parses the contents of `/proc/net/arp`.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.18.11    0x1         0x2         00:04:20:06:55:1a     *        eth0
/// ```
///
/// The header line fails the shape check and is skipped along with any
/// line that has fewer than four columns, an unparsable IP, a malformed MAC
/// or the all-zero MAC of an incomplete entry.
pub fn parse_arp_table(contents: &str) -> Vec<AddressRecord> {
    contents
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() <= ARP_MAC_COLUMN {
                return None;
            }
            record_from_columns(&columns, ARP_IP_COLUMN, ARP_MAC_COLUMN)
        })
        .collect()
}

/// Parses the output of `ip neigh show`.
///
/// ```text
/// 192.168.1.1 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE
/// 192.168.1.9 dev eth0 FAILED
/// ```
///
/// Lines with fewer than five columns (e.g. `FAILED` / `INCOMPLETE`
/// entries) are skipped.
pub fn parse_neighbor_output(output: &str) -> Vec<AddressRecord> {
    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() <= NEIGHBOR_MAC_COLUMN {
                return None;
            }
            record_from_columns(
                &columns,
                NEIGHBOR_IP_COLUMN,
                NEIGHBOR_MAC_COLUMN,
            )
        })
        .collect()
}

#[cfg_attr(test, automock)]
/// Trait describing where raw neighbor cache text comes from
pub trait NeighborSource: Send + Sync {
    /// Should return the contents of the ARP pseudo-file, or `None` if it
    /// could not be read
    fn arp_table(&self) -> Option<String>;

    /// Should return the output of the live neighbor command, or `None` if it
    /// could not be run or exited non-zero
    fn neighbor_command(&self) -> Option<String>;
}

/// Reads the neighbor cache of the host running this process
#[derive(Debug, Clone)]
pub struct SystemNeighbors {
    arp_path: PathBuf,
}

impl Default for SystemNeighbors {
    fn default() -> Self {
        Self {
            arp_path: PathBuf::from(PROC_NET_ARP),
        }
    }
}

impl SystemNeighbors {
    /// Returns a source that reads the ARP table from `arp_path` instead of
    /// [`PROC_NET_ARP`]
    pub fn with_arp_path(arp_path: impl Into<PathBuf>) -> Self {
        Self {
            arp_path: arp_path.into(),
        }
    }
}

impl NeighborSource for SystemNeighbors {
    fn arp_table(&self) -> Option<String> {
        match fs::read_to_string(&self.arp_path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                log::debug!(
                    "unable to read {}: {}",
                    self.arp_path.display(),
                    e
                );
                None
            }
        }
    }

    fn neighbor_command(&self) -> Option<String> {
        let mut cmd = Command::new(NEIGHBOR_PROGRAM);
        cmd.args(NEIGHBOR_ARGS);

        match process::run_with_deadline(
            &mut cmd,
            NEIGHBOR_COMMAND_TIMEOUT,
            || false,
        ) {
            Ok(out) if out.exit == ProcessExit::Exited(Some(0)) => {
                Some(out.stdout)
            }
            Ok(out) => {
                log::debug!("neighbor command ended with {:?}", out.exit);
                None
            }
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }
}

/// Merged view of the neighbor cache keyed by IP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborTable(pub HashMap<IpAddr, MacAddr>);

impl NeighborTable {
    /// Builds the merged table. Command records are inserted first and win;
    /// pseudo-file records only fill in addresses that are still missing.
    pub fn merge(
        command_records: &[AddressRecord],
        arp_records: &[AddressRecord],
    ) -> Self {
        let mut table: HashMap<IpAddr, MacAddr> = HashMap::new();

        for record in command_records {
            table.insert(record.ip, record.mac);
        }

        for record in arp_records {
            table.entry(record.ip).or_insert(record.mac);
        }

        Self(table)
    }

    /// Returns the MAC recorded for `ip`
    pub fn mac_for(&self, ip: IpAddr) -> Option<MacAddr> {
        self.0.get(&ip).copied()
    }

    /// Returns the first IP found for `mac`. When several IPs share a MAC
    /// which one is returned depends on map iteration order.
    pub fn ip_for(&self, mac: MacAddr) -> Option<IpAddr> {
        self.0
            .iter()
            .find(|(_, m)| **m == mac)
            .map(|(ip, _)| *ip)
    }

    /// Returns the number of entries in the table
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns all entries sorted by IP
    pub fn to_sorted_records(&self) -> Vec<AddressRecord> {
        let mut records: Vec<AddressRecord> = self
            .0
            .iter()
            .map(|(ip, mac)| AddressRecord { ip: *ip, mac: *mac })
            .collect();
        records.sort_by_key(|r| r.ip);
        records
    }
}

/// Resolves IP <-> MAC pairs from a [`NeighborSource`]. Every lookup reads
/// the source afresh so recently populated entries are always visible.
#[derive(Clone)]
pub struct AddressResolver {
    source: Arc<dyn NeighborSource>,
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemNeighbors::default()))
    }
}

impl AddressResolver {
    /// Returns a resolver reading from `source`
    pub fn new(source: Arc<dyn NeighborSource>) -> Self {
        Self { source }
    }

    /// Reads both sources and returns the merged table
    pub fn neighbor_table(&self) -> NeighborTable {
        let command_records = self
            .source
            .neighbor_command()
            .map(|out| parse_neighbor_output(&out))
            .unwrap_or_default();

        let arp_records = self
            .source
            .arp_table()
            .map(|contents| parse_arp_table(&contents))
            .unwrap_or_default();

        NeighborTable::merge(&command_records, &arp_records)
    }

    /// Looks up the MAC address for `ip`
    pub fn resolve_mac(&self, ip: IpAddr) -> Option<MacAddr> {
        self.neighbor_table().mac_for(ip)
    }

    /// Looks up an IP address for `mac`.
    ///
    /// # Errors
    ///
    /// Returns [`NetToolsError::InvalidInput`] if `mac` is not in the strict
    /// `aa:bb:cc:dd:ee:ff` form. The check happens before the neighbor cache
    /// is read.
    pub fn resolve_ip(&self, mac: &str) -> Result<Option<IpAddr>> {
        let mac = parse_mac(mac).ok_or_else(|| {
            NetToolsError::InvalidInput(format!("invalid MAC address: {mac}"))
        })?;

        Ok(self.neighbor_table().ip_for(mac))
    }

    /// Returns every IP address currently in the neighbor cache
    pub fn all_ips(&self) -> Vec<IpAddr> {
        self.neighbor_table()
            .to_sorted_records()
            .into_iter()
            .map(|r| r.ip)
            .collect()
    }

    /// Returns every MAC address currently in the neighbor cache
    pub fn all_macs(&self) -> Vec<MacAddr> {
        self.neighbor_table()
            .to_sorted_records()
            .into_iter()
            .map(|r| r.mac)
            .collect()
    }
}

#[cfg(test)]
#[path = "./neighbors_tests.rs"]
mod tests;
