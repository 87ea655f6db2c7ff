//! Provides Scanner implementation for discovering live devices on the local
//! subnet
//!
//! Every candidate host is pinged once. Hosts that answer are described with
//! their reverse DNS name, the MAC address found in the neighbor cache and
//! the vendor registered for that MAC's OUI prefix.

#[cfg(test)]
use mockall::automock;

use derive_builder::Builder;
use pnet::util::MacAddr;
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex, PoisonError, mpsc},
};
use threadpool::ThreadPool;

use crate::{
    error::{NetToolsError, Result},
    neighbors::AddressResolver,
    network,
    ping::{CommandPinger, PingOptions, Pinger},
    scanners::{
        ScanHandle, ScanMessage, ScanState, Scanner, Scanning, SubnetDevice,
        notify,
    },
    targets::ips::IPTargets,
};

/// Default number of hosts probed at once
pub const DEFAULT_SUBNET_CONCURRENCY: usize = 64;

#[cfg_attr(test, automock)]
/// Trait describing reverse name resolution
pub trait HostnameLookup: Send + Sync {
    /// Should return the host name of `ip`, or `None` if it has none
    fn hostname(&self, ip: IpAddr) -> Option<String>;
}

/// [`HostnameLookup`] backed by the system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseDns;

impl HostnameLookup for ReverseDns {
    fn hostname(&self, ip: IpAddr) -> Option<String> {
        log::debug!("looking up hostname for {}", ip);

        match dns_lookup::lookup_addr(&ip) {
            // the resolver echoes the address back when there is no name
            Ok(name) if name != ip.to_string() => Some(name),
            Ok(_) => None,
            Err(e) => {
                log::debug!("reverse lookup for {} failed: {}", ip, e);
                None
            }
        }
    }
}

/// Returns the organization registered for the OUI prefix of `mac`
pub fn lookup_vendor(mac: MacAddr) -> Option<String> {
    oui_data::lookup(&mac.to_string()).map(|v| v.organization().to_owned())
}

/// Data structure representing a subnet device scanner
#[derive(Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SubnetScanner {
    /// Hosts to probe. Defaults to the /24 of the first local IPv4 address.
    #[builder(default, setter(into, strip_option))]
    targets: Option<Arc<IPTargets>>,
    /// IPv4 addresses bound to this host
    #[builder(default = "network::local_ipv4_addresses()")]
    local_addresses: Vec<Ipv4Addr>,
    /// Reachability probe used for each host
    #[builder(default = "Arc::new(CommandPinger) as Arc<dyn Pinger>")]
    pinger: Arc<dyn Pinger>,
    /// Settings for each reachability probe
    #[builder(default)]
    ping_options: PingOptions,
    /// Reverse name resolution for reachable hosts
    #[builder(default = "Arc::new(ReverseDns) as Arc<dyn HostnameLookup>")]
    hostnames: Arc<dyn HostnameLookup>,
    /// MAC resolution for reachable hosts
    #[builder(default)]
    resolver: AddressResolver,
    /// Number of hosts probed at once
    #[builder(default = "DEFAULT_SUBNET_CONCURRENCY")]
    concurrency: usize,
    /// Channel for sending scan results and status messages
    #[builder(default, setter(into, strip_option))]
    notifier: Option<mpsc::Sender<ScanMessage>>,
}

impl SubnetScannerBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("concurrency must be at least 1".into());
        }
        Ok(())
    }
}

impl SubnetScanner {
    /// Returns builder for SubnetScanner
    pub fn builder() -> SubnetScannerBuilder {
        SubnetScannerBuilder::default()
    }

    /// Returns the hosts that will be probed
    ///
    /// # Errors
    ///
    /// Returns [`NetToolsError::InvalidInput`] when no targets were given and
    /// this host has no non-loopback IPv4 address to derive a subnet from
    pub fn targets(&self) -> Result<Arc<IPTargets>> {
        if let Some(targets) = &self.targets {
            return Ok(Arc::clone(targets));
        }

        let ip = self.local_addresses.first().ok_or_else(|| {
            NetToolsError::InvalidInput(
                "no local IPv4 address to derive a subnet from".into(),
            )
        })?;

        IPTargets::local_subnet(*ip)
    }

    fn describe(&self, ip: Ipv4Addr, latency_ms: f32) -> SubnetDevice {
        let addr = IpAddr::V4(ip);
        let is_current_host = self.local_addresses.contains(&ip);

        let hostname = self.hostnames.hostname(addr);

        let mac = self.resolver.resolve_mac(addr).or_else(|| {
            // the host never appears in its own neighbor cache
            if is_current_host {
                network::local_mac_for(addr)
            } else {
                None
            }
        });

        let vendor = mac.and_then(lookup_vendor);

        SubnetDevice {
            ip,
            hostname,
            mac,
            vendor,
            is_current_host,
            latency_ms,
        }
    }

    fn probe_host(
        &self,
        ip: Ipv4Addr,
        state: &ScanState,
        devices: &Mutex<Vec<SubnetDevice>>,
    ) -> Result<()> {
        let started = state
            .while_running(|| {
                notify(
                    &self.notifier,
                    ScanMessage::Info(Scanning {
                        ip: IpAddr::V4(ip),
                        port: None,
                    }),
                )
            })
            .transpose()?;

        if started.is_none() {
            return Ok(());
        }

        let outcome =
            self.pinger.ping(IpAddr::V4(ip), &self.ping_options, state);

        if !outcome.reachable || !state.is_running() {
            return Ok(());
        }

        let device = self.describe(ip, outcome.latency_ms.unwrap_or_default());

        log::debug!("found device {}", ip);

        state
            .while_running(|| {
                devices
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(device.clone());
                notify(&self.notifier, ScanMessage::DeviceFound(device))
            })
            .transpose()?;

        Ok(())
    }

    fn run(
        &self,
        targets: Arc<IPTargets>,
        state: Arc<ScanState>,
    ) -> Result<Vec<SubnetDevice>> {
        log::debug!(
            "discovering devices across {} hosts (concurrency {})",
            targets.len(),
            self.concurrency
        );

        let pool = ThreadPool::new(self.concurrency);
        let devices = Arc::new(Mutex::new(Vec::new()));
        let (err_tx, err_rx) = mpsc::channel::<NetToolsError>();

        targets.lazy_loop(|ip| {
            if !state.is_running() {
                return Ok(());
            }

            let scanner = self.clone();
            let state = Arc::clone(&state);
            let devices = Arc::clone(&devices);
            let err_tx = err_tx.clone();

            pool.execute(move || {
                if let Err(e) = scanner.probe_host(ip, &state, &devices) {
                    let _ = err_tx.send(e);
                }
            });

            Ok(())
        })?;

        pool.join();

        if pool.panic_count() > 0 {
            log::error!("{} host probe workers panicked", pool.panic_count());
            notify(
                &self.notifier,
                ScanMessage::Error(format!(
                    "{} host probe workers panicked",
                    pool.panic_count()
                )),
            )?;
        }

        if let Ok(e) = err_rx.try_recv() {
            return Err(e);
        }

        let status = state.finish();

        let mut found = devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        found.sort();

        log::debug!("subnet scan {:?}: {} devices", status, found.len());

        notify(&self.notifier, ScanMessage::DevicesDone(found.clone()))?;

        Ok(found)
    }
}

impl Scanner for SubnetScanner {
    type Output = Vec<SubnetDevice>;

    fn scan(&self) -> Result<ScanHandle<Vec<SubnetDevice>>> {
        let targets = self.targets()?;
        let scanner = self.clone();
        Ok(ScanHandle::spawn(move |state| scanner.run(targets, state)))
    }
}

#[cfg(test)]
#[path = "./subnet_scanner_tests.rs"]
mod tests;
