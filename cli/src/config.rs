//! Defaults for every subcommand, optionally read from a YAML file

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use r_nettools::ping::{DEFAULT_PING_COUNT, DEFAULT_TTL, MIN_PING_TIMEOUT_MS};
use r_nettools::scanners::subnet_scanner::DEFAULT_SUBNET_CONCURRENCY;

pub const CONFIG_FILE_NAME: &str = "config.yml";
pub const DEFAULT_PORTS: [&str; 5] = ["22", "80", "443", "2000-9999", "27017"];

/// Returns the default ports to scan as a vector of strings.
pub fn get_default_ports() -> Vec<String> {
    DEFAULT_PORTS
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<String>>()
}

/// Values used when a flag is not passed on the command line. Any field
/// missing from the file keeps its built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ports: Vec<String>,
    pub ping_count: u32,
    pub ping_timeout_ms: u64,
    pub ttl: u8,
    /// When unset the port scanner picks a timeout for the target's class
    pub port_timeout_ms: Option<u64>,
    /// When unset the port scanner picks a worker count for the target's
    /// class
    pub port_concurrency: Option<usize>,
    pub subnet_timeout_ms: u64,
    pub subnet_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ports: get_default_ports(),
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout_ms: MIN_PING_TIMEOUT_MS,
            ttl: DEFAULT_TTL,
            port_timeout_ms: None,
            port_concurrency: None,
            subnet_timeout_ms: MIN_PING_TIMEOUT_MS,
            subnet_concurrency: DEFAULT_SUBNET_CONCURRENCY,
        }
    }
}

impl Config {
    /// Reads the config at `path`. A missing file yields the defaults, an
    /// unparsable one yields the defaults plus a warning.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::debug!("no config at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_yaml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Failed to parse config file {}, using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

/// Returns the per-user location of the config file
pub fn get_project_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "r-nettools")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
#[path = "./config_tests.rs"]
mod tests;
