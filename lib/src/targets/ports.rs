//! Provides helpers for managing port target lists

use std::sync::Arc;

use crate::error::{NetToolsError, Result};

/// Every valid port
pub const ALL_PORTS: &str = "1-65535";
/// Ports that require elevated privileges to bind
pub const PRIVILEGED_PORTS: &str = "1-1023";

#[derive(Debug)]
/// Represents a list of Port targets
///
/// This wrapper is used to cut down on the memory needed to store entire
/// port ranges. Rather than storing all ports in a range of 1-65535, this
/// wrapper allows the storage of just the range in string form and then
/// dynamically loops the ports in that range when needed.
///
/// # Errors
///
/// Returns an error if an item in the list is not a port in `1..=65535` or
/// is a range whose start is greater than its end
///
/// # Examples
///
/// ```
/// # use r_nettools::error::Result;
/// # use r_nettools::targets::ports::PortTargets;
/// let print_port = |port: u16| -> Result<()> {
///   println!("port: {}", port);
///   Ok(())
/// };
/// let ports =
///     PortTargets::new(vec!["22".to_string(), "8000-8010".to_string()])
///         .unwrap();
/// ports.lazy_loop(print_port).unwrap();
/// ```
pub struct PortTargets(Vec<String>, usize);

fn parse_port(target: &str, value: &str) -> Result<u16> {
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|e| NetToolsError::from_port_parse_int_err(target, e))?;

    if port == 0 {
        return Err(NetToolsError::InvalidInput(format!(
            "port {target}: must be between 1 and 65535"
        )));
    }

    Ok(port)
}

fn loop_ports<F: FnMut(u16) -> Result<()>>(
    list: &[String],
    mut cb: F,
) -> Result<()> {
    for target in list.iter() {
        if let Some((begin, end)) = target.split_once('-') {
            let begin = parse_port(target, begin)?;
            let end = parse_port(target, end)?;

            if begin > end {
                return Err(NetToolsError::InvalidInput(format!(
                    "port range {target}: start is greater than end"
                )));
            }

            for port in begin..=end {
                cb(port)?;
            }
        } else {
            cb(parse_port(target, target)?)?;
        }
    }

    Ok(())
}

impl PortTargets {
    /// Returns a new instance of PortTargets using the provided list
    pub fn new(list: Vec<String>) -> Result<Arc<Self>> {
        let mut len = 0;
        loop_ports(&list, |_| {
            len += 1;
            Ok(())
        })?;
        Ok(Arc::new(Self(list, len)))
    }

    /// Returns targets covering a single port
    pub fn single(port: u16) -> Result<Arc<Self>> {
        Self::new(vec![port.to_string()])
    }

    /// Returns targets covering every port (1-65535)
    pub fn all() -> Arc<Self> {
        Arc::new(Self(vec![ALL_PORTS.to_string()], 65535))
    }

    /// Returns targets covering the privileged ports (1-1023)
    pub fn privileged() -> Arc<Self> {
        Arc::new(Self(vec![PRIVILEGED_PORTS.to_string()], 1023))
    }

    /// Returns true if the list is empty
    pub fn is_empty(&self) -> bool {
        self.1 == 0
    }

    /// Returns the true length of the target list. If the underlying
    /// `Vec<String>` is just `["22-24"]`, then a call to "len" will
    /// return 3
    pub fn len(&self) -> usize {
        self.1
    }

    /// loops over all targets including those that are not explicitly in the
    /// list but fall within a range defined in the list
    pub fn lazy_loop<F: FnMut(u16) -> Result<()>>(&self, cb: F) -> Result<()> {
        loop_ports(&self.0, cb)
    }
}

#[cfg(test)]
#[path = "./ports_tests.rs"]
mod tests;
