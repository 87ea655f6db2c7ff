//! Provides reachability probing via the system ping utility
//!
//! A single attempt ([`probe`]) runs one echo request through the external
//! `ping` / `ping6` binary and turns its text report into a [`PingOutcome`].
//! A [`PingSeries`] runs several attempts serially against one target and
//! aggregates them into a [`PingAggregate`].

#[cfg(test)]
use mockall::automock;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    net::IpAddr,
    process::Command,
    sync::{Arc, mpsc},
    time::Duration,
};

use crate::{
    error::Result,
    process::{self, ProcessExit, ProcessOutput},
    scanners::{ScanHandle, ScanMessage, ScanState, Scanner, Scanning, notify},
};

/// Ping binary used for IPv4 targets
pub const PING_PROGRAM: &str = "ping";
/// Ping binary used for IPv6 targets
pub const PING6_PROGRAM: &str = "ping6";
/// Extra time granted to the ping process beyond its own timeout before it
/// is killed
pub const PROCESS_GRACE: Duration = Duration::from_secs(1);
/// Default number of attempts in a ping series
pub const DEFAULT_PING_COUNT: u32 = 4;
/// Smallest per-attempt timeout accepted by [`PingOptions`]
pub const MIN_PING_TIMEOUT_MS: u64 = 1000;
/// Smallest time-to-live accepted by [`PingOptions`]
pub const MIN_TTL: u8 = 1;
/// Default time-to-live
pub const DEFAULT_TTL: u8 = 128;

const LOSS_MARKER: &str = "% packet loss";
const UNKNOWN_HOST_MARKER: &str = "unknown host";
const RTT_MARKERS: [&str; 2] = ["/mdev = ", "/stddev = "];
const RTT_TERMINATOR: &str = " ms";

/// Per-attempt ping settings. Setters clamp to the supported minimums, and
/// so does deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UncheckedPingOptions")]
pub struct PingOptions {
    timeout_ms: u64,
    ttl: u8,
}

#[derive(Deserialize)]
#[serde(default)]
struct UncheckedPingOptions {
    timeout_ms: u64,
    ttl: u8,
}

impl Default for UncheckedPingOptions {
    fn default() -> Self {
        let defaults = PingOptions::default();
        Self {
            timeout_ms: defaults.timeout_ms,
            ttl: defaults.ttl,
        }
    }
}

impl From<UncheckedPingOptions> for PingOptions {
    fn from(raw: UncheckedPingOptions) -> Self {
        PingOptions::default()
            .with_timeout_ms(raw.timeout_ms)
            .with_ttl(raw.ttl)
    }
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            timeout_ms: MIN_PING_TIMEOUT_MS,
            ttl: DEFAULT_TTL,
        }
    }
}

impl PingOptions {
    /// Sets the per-attempt timeout, raising anything below
    /// [`MIN_PING_TIMEOUT_MS`] to that floor
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.max(MIN_PING_TIMEOUT_MS);
        self
    }

    /// Sets the time-to-live, raising 0 to [`MIN_TTL`]
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl.max(MIN_TTL);
        self
    }

    /// Returns the per-attempt timeout in milliseconds
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Returns the time-to-live
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Returns the timeout in whole seconds as passed to the ping binary
    pub fn timeout_secs(&self) -> u64 {
        (self.timeout_ms / 1000).max(1)
    }

    /// Returns the timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of a single ping attempt. `reachable` implies `latency_ms` is set
/// and `error` is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingOutcome {
    /// The address that was pinged
    pub target: IpAddr,
    /// Whether an echo reply came back
    pub reachable: bool,
    /// Average round trip time reported by the ping binary
    pub latency_ms: Option<f32>,
    /// Why the attempt failed
    pub error: Option<String>,
    /// Full text report of the ping binary, when one was produced
    pub raw_output: Option<String>,
}

impl PingOutcome {
    /// Returns a successful outcome
    pub fn success(
        target: IpAddr,
        latency_ms: f32,
        raw_output: String,
    ) -> Self {
        Self {
            target,
            reachable: true,
            latency_ms: Some(latency_ms),
            error: None,
            raw_output: Some(raw_output),
        }
    }

    /// Returns an unreachable outcome carrying `error`
    pub fn failure(
        target: IpAddr,
        error: impl Into<String>,
        raw_output: Option<String>,
    ) -> Self {
        Self {
            target,
            reachable: false,
            latency_ms: None,
            error: Some(error.into()),
            raw_output,
        }
    }

    /// Returns true if the attempt failed with an error
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

fn packet_loss(report: &str) -> Option<Option<f32>> {
    let idx = report.find(LOSS_MARKER)?;
    let number: String = report[..idx]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    Some(number.parse::<f32>().ok())
}

fn average_rtt(report: &str) -> Option<f32> {
    let start = RTT_MARKERS
        .iter()
        .find_map(|m| report.find(m).map(|idx| idx + m.len()))?;
    let rest = &report[start..];
    let end = rest.find(RTT_TERMINATOR)?;
    rest[..end].split('/').nth(1)?.trim().parse::<f32>().ok()
}

/// Interprets the text report of a ping run that exited with status 0.
///
/// Zero loss yields the average round trip time (the second of the
/// `min/avg/max/mdev` figures). Total loss, partial loss, an unknown host
/// and anything else each yield a distinct error.
pub fn parse_ping_report(target: IpAddr, report: &str) -> PingOutcome {
    match packet_loss(report) {
        Some(Some(loss)) if loss == 0.0 => match average_rtt(report) {
            Some(avg) => PingOutcome::success(target, avg, report.to_string()),
            None => PingOutcome::failure(
                target,
                "parse error: missing round trip summary",
                Some(report.to_string()),
            ),
        },
        Some(Some(loss)) if loss >= 100.0 => PingOutcome::failure(
            target,
            "100% packet loss",
            Some(report.to_string()),
        ),
        Some(_) => PingOutcome::failure(
            target,
            "partial packet loss",
            Some(report.to_string()),
        ),
        None if report.contains(UNKNOWN_HOST_MARKER) => PingOutcome::failure(
            target,
            "unknown host",
            Some(report.to_string()),
        ),
        None => PingOutcome::failure(
            target,
            "unknown error",
            Some(report.to_string()),
        ),
    }
}

fn outcome_from_process(
    target: IpAddr,
    output: ProcessOutput,
) -> PingOutcome {
    match output.exit {
        ProcessExit::Exited(Some(0)) => {
            parse_ping_report(target, &output.stdout)
        }
        ProcessExit::Exited(Some(1)) => PingOutcome::failure(
            target,
            "failed, exit = 1",
            Some(output.stdout),
        ),
        ProcessExit::Exited(Some(code)) => PingOutcome::failure(
            target,
            format!("error, exit = {code}"),
            Some(output.stdout),
        ),
        ProcessExit::Exited(None) => {
            PingOutcome::failure(target, "error, terminated by signal", None)
        }
        ProcessExit::TimedOut => {
            PingOutcome::failure(target, "timed out", None)
        }
        ProcessExit::Aborted => PingOutcome::failure(target, "cancelled", None),
    }
}

/// Builds the ping invocation for a single echo request:
/// `<ping|ping6> -c 1 -W <secs> -t <ttl> <addr>`
pub fn ping_command(target: IpAddr, options: &PingOptions) -> Command {
    let program = if target.is_ipv6() {
        PING6_PROGRAM
    } else {
        PING_PROGRAM
    };

    let mut cmd = Command::new(program);
    cmd.args([
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        options.timeout_secs().to_string(),
        "-t".to_string(),
        options.ttl().to_string(),
        target.to_string(),
    ]);
    cmd
}

#[cfg_attr(test, automock)]
/// Trait describing a single-attempt reachability probe
pub trait Pinger: Send + Sync {
    /// Should perform one attempt against `target`. Implementations should
    /// give up early once `state` stops running.
    fn ping(
        &self,
        target: IpAddr,
        options: &PingOptions,
        state: &ScanState,
    ) -> PingOutcome;
}

/// [`Pinger`] backed by the system ping binary
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPinger;

impl Pinger for CommandPinger {
    fn ping(
        &self,
        target: IpAddr,
        options: &PingOptions,
        state: &ScanState,
    ) -> PingOutcome {
        let mut cmd = ping_command(target, options);

        log::debug!("pinging {} with {:?}", target, options);

        match process::run_with_deadline(
            &mut cmd,
            options.timeout() + PROCESS_GRACE,
            || !state.is_running(),
        ) {
            Ok(output) => outcome_from_process(target, output),
            Err(e) => PingOutcome::failure(target, e.to_string(), None),
        }
    }
}

/// Performs a single ping attempt against `target`
pub fn probe(target: IpAddr, options: &PingOptions) -> PingOutcome {
    CommandPinger.ping(target, options, &ScanState::running())
}

/// Summary of a ping series. Latency figures only cover successful attempts
/// and are `None` when every attempt was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingAggregate {
    /// The address that was pinged
    pub target: IpAddr,
    /// Number of attempts that were made
    pub attempts: u32,
    /// Number of attempts that got no reply
    pub lost: u32,
    /// Fastest round trip
    pub min_ms: Option<f32>,
    /// Slowest round trip
    pub max_ms: Option<f32>,
    /// Average round trip
    pub avg_ms: Option<f32>,
}

impl PingAggregate {
    /// Returns true if at least one attempt got a reply
    pub fn is_reachable(&self) -> bool {
        self.attempts > self.lost
    }
}

impl Display for PingAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = |v: Option<f32>| match v {
            Some(v) => format!("{v:.3}"),
            None => "N/A".to_string(),
        };

        write!(
            f,
            "{}: {} attempts, {} lost, min/avg/max = {}/{}/{} ms",
            self.target,
            self.attempts,
            self.lost,
            ms(self.min_ms),
            ms(self.avg_ms),
            ms(self.max_ms),
        )
    }
}

struct PingTally {
    target: IpAddr,
    attempts: u32,
    lost: u32,
    min_ms: Option<f32>,
    max_ms: Option<f32>,
    total_ms: f32,
}

impl PingTally {
    fn new(target: IpAddr) -> Self {
        Self {
            target,
            attempts: 0,
            lost: 0,
            min_ms: None,
            max_ms: None,
            total_ms: 0.0,
        }
    }

    fn record(&mut self, outcome: &PingOutcome) {
        self.attempts += 1;

        match outcome.latency_ms {
            Some(ms) if outcome.reachable => {
                self.min_ms = Some(self.min_ms.map_or(ms, |m| m.min(ms)));
                self.max_ms = Some(self.max_ms.map_or(ms, |m| m.max(ms)));
                self.total_ms += ms;
            }
            _ => self.lost += 1,
        }
    }

    fn into_aggregate(self) -> PingAggregate {
        let replies = self.attempts - self.lost;
        let avg_ms = (replies > 0).then(|| self.total_ms / replies as f32);

        PingAggregate {
            target: self.target,
            attempts: self.attempts,
            lost: self.lost,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
            avg_ms,
        }
    }
}

/// Serial series of ping attempts against one target
///
/// Attempts never overlap: each one starts only after the previous
/// attempt's result has been delivered.
#[derive(Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct PingSeries {
    /// Probe used for each attempt
    #[builder(default = "Arc::new(CommandPinger) as Arc<dyn Pinger>")]
    pinger: Arc<dyn Pinger>,
    /// Address to ping
    target: IpAddr,
    /// Per-attempt settings
    #[builder(default)]
    options: PingOptions,
    /// Number of attempts
    #[builder(default = "DEFAULT_PING_COUNT")]
    count: u32,
    /// Channel receiving each attempt and the final aggregate
    #[builder(default, setter(into, strip_option))]
    notifier: Option<mpsc::Sender<ScanMessage>>,
}

impl PingSeriesBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.count == Some(0) {
            return Err("count must be at least 1".into());
        }
        Ok(())
    }
}

impl PingSeries {
    /// Returns builder for PingSeries
    pub fn builder() -> PingSeriesBuilder {
        PingSeriesBuilder::default()
    }

    /// Runs the series on the calling thread and returns the aggregate
    pub fn run(&self) -> Result<PingAggregate> {
        let state = ScanState::new();
        state.begin();
        self.run_with_state(&state)
    }

    fn run_with_state(&self, state: &ScanState) -> Result<PingAggregate> {
        let mut tally = PingTally::new(self.target);

        for attempt in 1..=self.count {
            let started = state
                .while_running(|| {
                    notify(
                        &self.notifier,
                        ScanMessage::Info(Scanning {
                            ip: self.target,
                            port: None,
                        }),
                    )
                })
                .transpose()?;

            if started.is_none() {
                break;
            }

            log::debug!(
                "ping attempt {}/{} to {}",
                attempt,
                self.count,
                self.target
            );

            let outcome = self.pinger.ping(self.target, &self.options, state);

            let delivered = state
                .while_running(|| {
                    tally.record(&outcome);
                    notify(&self.notifier, ScanMessage::PingResult(outcome))
                })
                .transpose()?;

            if delivered.is_none() {
                log::debug!("ping series to {} cancelled", self.target);
                break;
            }
        }

        state.finish();

        let aggregate = tally.into_aggregate();

        notify(&self.notifier, ScanMessage::PingDone(aggregate.clone()))?;

        Ok(aggregate)
    }
}

impl Scanner for PingSeries {
    type Output = PingAggregate;

    fn scan(&self) -> Result<ScanHandle<PingAggregate>> {
        let series = self.clone();
        Ok(ScanHandle::spawn(move |state| series.run_with_state(&state)))
    }
}

#[cfg(test)]
#[path = "./ping_tests.rs"]
mod tests;
