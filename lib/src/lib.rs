//! Library package for local network diagnostics
//!
//! Determines reachability of hosts (ping), discovers open ports on a host
//! (TCP / UDP), resolves IP <-> MAC pairs from the kernel neighbor cache and
//! enumerates live devices on the local subnet.
//!
//! # Examples
//!
//! ## Ping
//!
//! ```bash
//! cargo run --example ping -p r-nettools -- 192.168.1.1
//! ```
//!
//! ## Port Scanning
//!
//! ```bash
//! cargo run --example port-scanner -p r-nettools -- 192.168.1.1
//! ```
//!
//! ## Subnet Device Discovery
//!
//! ```bash
//! cargo run --example subnet-scanner -p r-nettools
//! ```

#![deny(missing_docs)]
pub mod error;
pub mod neighbors;
pub mod network;
pub mod ping;
pub mod process;
pub mod scanners;
pub mod targets;

mod serde_display;
