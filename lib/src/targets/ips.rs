//! Provides helpers for managing IP target lists

use std::{net, str::FromStr, sync::Arc};

use crate::{
    error::{NetToolsError, Result},
    network,
};

#[derive(Debug)]
/// Represents a list of IPv4 targets
///
/// Rather than storing all 65536 IPs of a /16 CIDR block, or every IP of a
/// range, this wrapper stores the CIDR or range in string form and loops the
/// IPs in that block when needed. CIDR blocks expand to their usable hosts,
/// so the network and broadcast addresses are never visited.
///
/// # Errors
///
/// Returns an error if an item in the list is not a valid IP, CIDR block or
/// range
///
/// # Examples
///
/// ```
/// # use std::net;
/// # use r_nettools::error::Result;
/// # use r_nettools::targets::ips::IPTargets;
/// let print_ip = |ip: net::Ipv4Addr| -> Result<()> {
///   println!("ip: {}", ip);
///   Ok(())
/// };
/// let ips = IPTargets::new(
///     vec![
///       "192.168.0.1".to_string(),
///       "172.17.0.1-172.17.0.24".to_string(),
///       "192.168.68.1/24".to_string(),
///     ]
/// ).unwrap();
/// ips.lazy_loop(print_ip).unwrap();
/// ```
pub struct IPTargets(Vec<String>, usize);

fn parse_ip(target: &str, value: &str) -> Result<net::Ipv4Addr> {
    net::Ipv4Addr::from_str(value.trim())
        .map_err(|e| NetToolsError::from_net_addr_parse_error(target, e))
}

fn loop_ips<F: FnMut(net::Ipv4Addr) -> Result<()>>(
    list: &[String],
    mut cb: F,
) -> Result<()> {
    for target in list.iter() {
        if let Some((begin, end)) = target.split_once('-') {
            let begin = parse_ip(target, begin)?;
            let end = parse_ip(target, end)?;

            if begin > end {
                return Err(NetToolsError::InvalidInput(format!(
                    "ip range {target}: start is greater than end"
                )));
            }

            for ip_net in ipnet::Ipv4Subnets::new(begin, end, 32) {
                for ip in ip_net.hosts() {
                    cb(ip)?;
                }
            }
        } else if target.contains('/') {
            let ip_net = ipnet::Ipv4Net::from_str(target.trim()).map_err(|e| {
                NetToolsError::from_ipnet_addr_parse_error(target, e)
            })?;

            for ip in ip_net.hosts() {
                cb(ip)?;
            }
        } else {
            cb(parse_ip(target, target)?)?;
        }
    }
    Ok(())
}

impl IPTargets {
    /// Returns a new instance of IPTargets using the provided list
    pub fn new(list: Vec<String>) -> Result<Arc<Self>> {
        let mut len = 0;

        loop_ips(&list, |_| {
            len += 1;
            Ok(())
        })?;

        Ok(Arc::new(Self(list, len)))
    }

    /// Returns the hosts of the /24 that `ip` belongs to, e.g.
    /// `192.168.1.37` covers `192.168.1.1` through `192.168.1.254`
    pub fn local_subnet(ip: net::Ipv4Addr) -> Result<Arc<Self>> {
        Self::new(vec![network::local_subnet_cidr(ip)])
    }

    /// Returns the true length of the target list. If the underlying
    /// `Vec<String>` is just `["192.168.0.1/24"]`, then a call to "len" will
    /// return 254
    pub fn len(&self) -> usize {
        self.1
    }

    /// Returns true if the list is empty
    pub fn is_empty(&self) -> bool {
        self.1 == 0
    }

    /// loops over all targets including those that are not explicitly in the
    /// list but fall within a range or CIDR block defined in the list
    pub fn lazy_loop<F: FnMut(net::Ipv4Addr) -> Result<()>>(
        &self,
        cb: F,
    ) -> Result<()> {
        loop_ips(&self.0, cb)
    }
}

#[cfg(test)]
#[path = "./ips_tests.rs"]
mod tests;
