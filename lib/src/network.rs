//! Provides helpers for inspecting local network interfaces and classifying
//! addresses

use pnet::{datalink, util::MacAddr};
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use crate::error::{NetToolsError, Result};

/// Prefix length assumed for the local subnet when discovering devices
pub const LOCAL_SUBNET_PREFIX: u8 = 24;

/// Returns true if `address` is a dotted-quad IPv4 literal
pub fn is_ipv4_literal(address: &str) -> bool {
    Ipv4Addr::from_str(address).is_ok()
}

/// Returns true if `address` is an IPv6 literal, in either the full eight
/// group form or the `::` compressed form
pub fn is_ipv6_literal(address: &str) -> bool {
    Ipv6Addr::from_str(address).is_ok()
}

/// Returns every non-loopback IPv4 address bound to a local interface.
/// Interfaces are enumerated in the order the OS reports them.
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    datalink::interfaces()
        .iter()
        .flat_map(|iface| iface.ips.iter())
        .filter_map(|net| match net.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
            _ => None,
        })
        .collect()
}

/// Returns the first non-loopback IPv4 address bound to a local interface
pub fn first_local_ipv4() -> Option<Ipv4Addr> {
    local_ipv4_addresses().into_iter().next()
}

/// Returns true if `addr` is the unspecified address, a loopback address, or
/// is bound to one of the local interfaces
pub fn is_localhost(addr: IpAddr) -> bool {
    if addr.is_unspecified() || addr.is_loopback() {
        return true;
    }

    datalink::interfaces()
        .iter()
        .any(|iface| iface.ips.iter().any(|net| net.ip() == addr))
}

/// Returns true if `addr` falls in a private / site-local range
pub fn is_local_network(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => ip.is_private(),
        IpAddr::V6(ip) => {
            let first = ip.segments()[0];
            // fec0::/10 (site-local) and fc00::/7 (unique local)
            (first & 0xffc0) == 0xfec0 || (first & 0xfe00) == 0xfc00
        }
    }
}

/// Returns the MAC address of the local interface that `addr` is bound to
pub fn local_mac_for(addr: IpAddr) -> Option<MacAddr> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.ips.iter().any(|net| net.ip() == addr))
        .and_then(|iface| iface.mac)
}

/// Resolves a scan target. The target may be an IP literal or a host name,
/// in which case the first resolved address is used.
///
/// # Errors
///
/// Returns [`NetToolsError::InvalidInput`] for an empty target and
/// [`NetToolsError::Lookup`] when a host name does not resolve
pub fn resolve_target(target: &str) -> Result<IpAddr> {
    let target = target.trim();

    if target.is_empty() {
        return Err(NetToolsError::InvalidInput(
            "target must not be empty".into(),
        ));
    }

    if let Ok(ip) = IpAddr::from_str(target) {
        return Ok(ip);
    }

    log::debug!("resolving host name {}", target);

    let lookup_err = |error: String| NetToolsError::Lookup {
        host: target.to_string(),
        error,
    };

    dns_lookup::lookup_host(target)
        .map_err(|e| lookup_err(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| lookup_err("no addresses found".into()))
}

/// Returns the CIDR block of the /24 that `ip` belongs to, e.g.
/// `192.168.1.37` -> `192.168.1.0/24`
pub fn local_subnet_cidr(ip: Ipv4Addr) -> String {
    match ipnet::Ipv4Net::new(ip, LOCAL_SUBNET_PREFIX) {
        Ok(net) => net.trunc().to_string(),
        Err(_) => format!("{ip}/32"),
    }
}

#[cfg(test)]
#[path = "./network_tests.rs"]
mod tests;
