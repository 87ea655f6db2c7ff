//! Runs external utilities with an enforced deadline
//!
//! Every invocation is bounded: the child is polled until it exits, and is
//! killed if the deadline passes or the caller asks to abort (e.g. the scan
//! owning the probe was cancelled).

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::error::{NetToolsError, Result};

/// How often a running child is polled for exit / abort
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Describes how a child process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited on its own. `None` when it was terminated by a
    /// signal rather than returning an exit code
    Exited(Option<i32>),
    /// The deadline passed and the process was killed
    TimedOut,
    /// The caller aborted and the process was killed
    Aborted,
}

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// How the process ended
    pub exit: ProcessExit,
    /// Everything the process wrote to stdout (lossily decoded as UTF-8)
    pub stdout: String,
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("failed to kill child process: {}", e);
    }
    let _ = child.wait();
}

/// Spawns `command` and waits for it to exit, killing it once `deadline`
/// elapses or as soon as `abort` returns true.
///
/// Stdout is drained on a separate thread so a chatty child can never block
/// on a full pipe.
///
/// # Errors
///
/// Returns [`NetToolsError::ProcessInvocation`] if the program cannot be
/// launched or waited on
pub fn run_with_deadline<F: Fn() -> bool>(
    command: &mut Command,
    deadline: Duration,
    abort: F,
) -> Result<ProcessOutput> {
    let program = command.get_program().to_string_lossy().into_owned();

    let invocation_error =
        |e: std::io::Error| NetToolsError::ProcessInvocation {
            program: program.clone(),
            error: e.to_string(),
        };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(invocation_error)?;

    let reader = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let started = Instant::now();

    let exit = loop {
        match child.try_wait() {
            Ok(Some(status)) => break ProcessExit::Exited(status.code()),
            Ok(None) => {}
            Err(e) => {
                reap(&mut child);
                return Err(invocation_error(e));
            }
        }

        if abort() {
            log::debug!("aborting {}", program);
            reap(&mut child);
            break ProcessExit::Aborted;
        }

        if started.elapsed() >= deadline {
            log::debug!("{} exceeded deadline of {:?}", program, deadline);
            reap(&mut child);
            break ProcessExit::TimedOut;
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = reader
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default();

    Ok(ProcessOutput { exit, stdout })
}

#[cfg(test)]
#[path = "./process_tests.rs"]
mod tests;
