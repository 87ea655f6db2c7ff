//! Custom Error and Result types for this library

use std::{any::Any, num::ParseIntError, sync::mpsc::SendError};
use thiserror::Error;

use crate::{
    ping::PingSeriesBuilderError,
    scanners::{
        ScanMessage, port_scanner::PortScannerBuilderError,
        subnet_scanner::SubnetScannerBuilderError,
    },
};

/// Custom Error type for this library
#[derive(Error, Debug)]
pub enum NetToolsError {
    /// Malformed caller input (MAC / IP literal, empty target, bad port or
    /// scan parameter). Always raised before any I/O takes place.
    #[error("invalid input: {_0}")]
    InvalidInput(String),

    /// An external utility could not be launched or waited on
    #[error("failed to run {program}: {error}")]
    ProcessInvocation {
        /// The program that was being invoked
        program: String,
        /// The underlying I/O error message
        error: String,
    },

    /// A host name could not be resolved
    #[error("failed to resolve {host}: {error}")]
    Lookup {
        /// The host name being resolved
        host: String,
        /// The underlying resolver error message
        error: String,
    },

    /// Errors resulting from events channel
    #[error("failed to send notification message: {:#?}", _0)]
    NotifierSendError(#[from] SendError<Box<ScanMessage>>),

    /// Generic thread error
    #[error("thread error: {_0}")]
    ThreadError(String),

    /// Error resulting from failure to build a port scanner
    #[error("failed to build port scanner: {_0}")]
    PortScannerBuild(#[from] PortScannerBuilderError),

    /// Error resulting from failure to build a subnet scanner
    #[error("failed to build subnet scanner: {_0}")]
    SubnetScannerBuild(#[from] SubnetScannerBuilderError),

    /// Error resulting from failure to build a ping series
    #[error("failed to build ping series: {_0}")]
    PingSeriesBuild(#[from] PingSeriesBuilderError),
}

impl From<Box<dyn Any + Send>> for NetToolsError {
    fn from(value: Box<dyn Any + Send>) -> Self {
        if let Some(s) = value.downcast_ref::<&'static str>() {
            Self::ThreadError(format!("Thread panicked with: {}", s))
        } else if let Some(s) = value.downcast_ref::<String>() {
            Self::ThreadError(format!("Thread panicked with: {}", s))
        } else {
            Self::ThreadError("Thread panicked with an unknown type".into())
        }
    }
}

impl NetToolsError {
    /// Converter for std::net::AddrParseError
    pub fn from_net_addr_parse_error(
        ip: &str,
        error: std::net::AddrParseError,
    ) -> Self {
        Self::InvalidInput(format!("{ip}: {error}"))
    }

    /// Converter for ipnet::AddrParseError
    pub fn from_ipnet_addr_parse_error(
        ip: &str,
        error: ipnet::AddrParseError,
    ) -> Self {
        Self::InvalidInput(format!("{ip}: {error}"))
    }

    /// Converter for ParseIntError
    pub fn from_port_parse_int_err(port: &str, error: ParseIntError) -> Self {
        Self::InvalidInput(format!("port {port}: {error}"))
    }

    /// Converter for channel send errors
    pub fn from_channel_send_error(e: SendError<ScanMessage>) -> Self {
        NetToolsError::NotifierSendError(SendError(Box::from(e.0)))
    }
}

/// Custom Result type for this library. All Errors exposed by this library
/// will be returned as [`NetToolsError`]
pub type Result<T> = std::result::Result<T, NetToolsError>;
