//! Provides helpers for expanding IP and port target lists

pub mod ips;
pub mod ports;
