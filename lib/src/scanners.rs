//! Provides data structures shared by every scanner plus the handle used to
//! observe and cancel a running scan
//!
//! This includes:
//! - Port scanning (TCP connect / UDP heuristic)
//! - Subnet device discovery (ping sweep + neighbor cache)
//!
//! The serial ping series in [`crate::ping`] reuses the same handle and
//! message types.

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread::{self, JoinHandle},
};

use crate::{
    error::{NetToolsError, Result},
    ping::{PingAggregate, PingOutcome},
    serde_display,
};

/// Transport protocol used when probing a port
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum Protocol {
    /// Full TCP connect
    #[default]
    Tcp,
    /// UDP send / receive heuristic
    Udp,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Outcome of probing a single port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProbeResult {
    /// The probed port
    pub port: u16,
    /// The protocol used for the probe
    pub protocol: Protocol,
    /// Whether the port was judged open
    pub open: bool,
}

/// Data structure representing a live device found on the subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetDevice {
    /// IPv4 of the device
    pub ip: Ipv4Addr,
    /// Reverse DNS name of the device if it resolved
    pub hostname: Option<String>,
    /// MAC address of the device if it was in the neighbor cache
    #[serde(with = "serde_display::option")]
    pub mac: Option<MacAddr>,
    /// Vendor of the device's network card if known
    pub vendor: Option<String>,
    /// Whether or not the device is the current host running the scan
    pub is_current_host: bool,
    /// Round trip time of the reachability probe in milliseconds
    pub latency_ms: f32,
}

impl PartialEq for SubnetDevice {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip
    }
}

impl Eq for SubnetDevice {}

impl Ord for SubnetDevice {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ip.cmp(&other.ip)
    }
}

impl PartialOrd for SubnetDevice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
/// Data structure representing a message that a unit is being scanned
pub struct Scanning {
    /// IP of the target
    pub ip: IpAddr,
    /// Port being scanned
    pub port: Option<u16>,
}

#[derive(Debug)]
/// Generic enum representing the various kinds of scanning messages over the
/// mpsc channel. Per-unit messages arrive in completion order; exactly one
/// of the `*Done` messages closes every run.
pub enum ScanMessage {
    /// Sent to inform that a unit is about to be scanned
    Info(Scanning),
    /// Sent after every attempt of a ping series
    PingResult(PingOutcome),
    /// Sent after every port probe
    PortResult(PortProbeResult),
    /// Sent whenever a subnet host answers
    DeviceFound(SubnetDevice),
    /// Sent when a worker fails; the scan carries on without that unit
    Error(String),
    /// A ping series has finished
    PingDone(PingAggregate),
    /// A port scan has finished, carrying open ports in ascending order
    PortsDone(Vec<u16>),
    /// A subnet scan has finished, carrying devices in ascending IP order
    DevicesDone(Vec<SubnetDevice>),
}

/// Lifecycle of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Configured but not started
    Created,
    /// Units are being processed
    Running,
    /// The scan thread exited without being cancelled
    Completed,
    /// The scan was cancelled before every unit was processed
    Cancelled,
}

impl ScanStatus {
    /// Returns true for `Completed` and `Cancelled`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Cancelled)
    }
}

/// Shared state of one scan.
///
/// Per-unit result delivery happens while holding the status lock (see
/// [`ScanState::while_running`]), so once [`ScanState::cancel`] returns no
/// further unit results are recorded or sent.
#[derive(Debug)]
pub struct ScanState {
    status: Mutex<ScanStatus>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanState {
    /// Returns a new state in [`ScanStatus::Created`]
    pub fn new() -> Self {
        Self {
            status: Mutex::new(ScanStatus::Created),
        }
    }

    /// Returns a state that is already running, for one-off probes that are
    /// not part of a scan
    pub fn running() -> Self {
        Self {
            status: Mutex::new(ScanStatus::Running),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScanStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current status
    pub fn status(&self) -> ScanStatus {
        *self.lock()
    }

    /// Returns true while the scan is running
    pub fn is_running(&self) -> bool {
        self.status() == ScanStatus::Running
    }

    /// Returns true once the scan has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.status() == ScanStatus::Cancelled
    }

    pub(crate) fn begin(&self) {
        let mut status = self.lock();
        if *status == ScanStatus::Created {
            *status = ScanStatus::Running;
        }
    }

    /// Moves a running scan to [`ScanStatus::Cancelled`]. Returns false (and
    /// does nothing) if the scan is not running.
    pub fn cancel(&self) -> bool {
        let mut status = self.lock();
        if *status != ScanStatus::Running {
            return false;
        }
        *status = ScanStatus::Cancelled;
        true
    }

    /// Moves a running scan to [`ScanStatus::Completed`] and returns the
    /// terminal status, which is `Cancelled` if cancellation won the race
    pub(crate) fn finish(&self) -> ScanStatus {
        let mut status = self.lock();
        if *status == ScanStatus::Running {
            *status = ScanStatus::Completed;
        }
        *status
    }

    /// Runs `f` while holding the status lock, but only if the scan is still
    /// running
    pub(crate) fn while_running<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let status = self.lock();
        if *status != ScanStatus::Running {
            return None;
        }
        let res = f();
        drop(status);
        Some(res)
    }
}

// Finalizes the state even when the scan thread unwinds
struct FinishOnDrop(Arc<ScanState>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        let status = self.0.finish();
        if thread::panicking() {
            log::error!("scan thread panicked, status {:?}", status);
        }
    }
}

/// Handle to a scan running on its own thread
pub struct ScanHandle<T> {
    state: Arc<ScanState>,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> ScanHandle<T> {
    /// Starts `f` on a new thread with a freshly running [`ScanState`].
    /// The state is finalized when `f` returns or panics if `f` did not do
    /// so itself.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce(Arc<ScanState>) -> Result<T> + Send + 'static,
    {
        let state = Arc::new(ScanState::new());
        state.begin();

        let thread_state = Arc::clone(&state);

        let handle = thread::spawn(move || -> Result<T> {
            let _finish = FinishOnDrop(Arc::clone(&thread_state));
            f(thread_state)
        });

        Self { state, handle }
    }
}

impl<T> ScanHandle<T> {
    /// Requests cancellation. Units that have not started are skipped and
    /// in-flight units are dropped from the result. A no-op once the scan
    /// has reached a terminal status.
    pub fn cancel(&self) {
        if self.state.cancel() {
            log::debug!("scan cancelled");
        }
    }

    /// Returns the current status of the scan
    pub fn status(&self) -> ScanStatus {
        self.state.status()
    }

    /// Returns the shared state, e.g. to cancel from another thread
    pub fn state(&self) -> Arc<ScanState> {
        Arc::clone(&self.state)
    }

    /// Returns true once the scan thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the scan to finish and returns its aggregate result
    pub fn join(self) -> Result<T> {
        self.handle.join().map_err(NetToolsError::from)?
    }
}

/// Trait used by all scanners
pub trait Scanner: Sync + Send {
    /// Aggregate produced when the scan finishes
    type Output: Send + 'static;

    /// Starts the scan on a background thread
    fn scan(&self) -> Result<ScanHandle<Self::Output>>;
}

pub(crate) fn notify(
    notifier: &Option<mpsc::Sender<ScanMessage>>,
    msg: ScanMessage,
) -> Result<()> {
    match notifier {
        Some(tx) => {
            tx.send(msg).map_err(NetToolsError::from_channel_send_error)
        }
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "./scanners_tests.rs"]
mod tests;

pub mod port_scanner;
pub mod subnet_scanner;
