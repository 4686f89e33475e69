//! Session driver.
//!
//! A [`Session`] owns the device handle, the optional log sink and the
//! shutdown flag. It is the single place where the loop starts and where
//! teardown happens:
//!
//! 1. `open` - open the device, apply the line discipline, open the log
//! 2. `run` - install the shutdown bridge, run the loop, tear down
//!
//! `run` consumes the session, so the loop cannot be restarted and teardown
//! runs exactly once whichever way the loop ended.

use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;

use sterm_core::{BaudRate, SessionError, SessionProfile, SessionResult, TeardownError};
use tracing::{debug, error, info, warn};

use crate::bridge::{Bridge, BridgeContext, BridgeStats, LoopState, SessionEnd};
use crate::device::SerialDevice;
use crate::discipline;
use crate::log::LogSink;
use crate::shutdown::{BlockedSignals, ShutdownBridge, ShutdownFlag, SHUTDOWN_SIGNALS};

/// How a session ended, plus anything that went wrong while cleaning up.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Normal termination reason, or the fatal error that ended the loop.
    pub end: Result<SessionEnd, SessionError>,
    /// Close failures, in teardown order.
    pub teardown: Vec<TeardownError>,
    pub stats: BridgeStats,
    pub state: LoopState,
    pub log_path: Option<PathBuf>,
}

impl SessionOutcome {
    /// True when the loop ended normally and every resource closed cleanly.
    pub fn is_success(&self) -> bool {
        self.end.is_ok() && self.teardown.is_empty()
    }
}

/// An open, configured session waiting to run.
#[derive(Debug)]
pub struct Session {
    profile: SessionProfile,
    device: SerialDevice,
    log: Option<LogSink>,
    shutdown: ShutdownFlag,
    signals: Vec<libc::c_int>,
    baud: BaudRate,
}

impl Session {
    /// Opens the profile's device and prepares it for the loop.
    pub fn open(profile: SessionProfile) -> SessionResult<Self> {
        let device =
            SerialDevice::open(profile.device()).map_err(|source| SessionError::DeviceOpen {
                path: profile.device.clone(),
                source,
            })?;
        info!(device = %profile.device.display(), "Serial port opened");
        Self::with_device(profile, device)
    }

    /// Configures an already-open device and opens the log sink.
    ///
    /// On failure the device is closed before the error is returned.
    pub fn with_device(profile: SessionProfile, device: SerialDevice) -> SessionResult<Self> {
        let prepared = discipline::configure(&device, &profile)
            .map_err(SessionError::from)
            .and_then(|baud| {
                let log = LogSink::open(&profile.log_target)?;
                Ok((baud, log))
            });

        let (baud, log) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Err(close_err) = device.close() {
                    warn!(error = %close_err, "Failed to close serial port after setup error");
                }
                return Err(e);
            }
        };

        Ok(Self {
            profile,
            device,
            log,
            shutdown: ShutdownFlag::new(),
            signals: SHUTDOWN_SIGNALS.to_vec(),
            baud,
        })
    }

    /// Replaces the signals that trigger shutdown.
    ///
    /// Signals that cannot carry a handler (`SIGKILL`, `SIGSTOP`,
    /// `SIGSEGV`, `SIGILL`, `SIGFPE`) make [`Session::run`] end with
    /// [`SessionError::SignalSetup`] before the loop starts; teardown still
    /// runs.
    pub fn with_shutdown_signals(mut self, signals: &[libc::c_int]) -> Self {
        self.signals = signals.to_vec();
        self
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }

    pub fn log_path(&self) -> Option<&std::path::Path> {
        self.log.as_ref().map(LogSink::path)
    }

    /// The flag the interrupt handler raises.
    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    /// Runs the loop against the given console, then tears down.
    ///
    /// The shutdown signals are blocked on the calling thread for the
    /// duration of the loop and let through only while it waits, so the
    /// loop should run on the thread that is meant to receive them.
    pub fn run<R, W>(mut self, console_in: R, console_out: W) -> SessionOutcome
    where
        R: Read + AsFd,
        W: Write,
    {
        let mut state = LoopState::Running;
        debug!(state = ?state, "Session loop starting");

        // Handlers go in before the mask and come out after it, so a signal
        // still pending when the mask is restored lands on our handler.
        let setup = ShutdownBridge::install(&self.shutdown, &self.device, &self.signals)
            .and_then(|handlers| Ok((handlers, BlockedSignals::block(&self.signals)?)));

        let (end, stats) = match setup {
            Ok((_handlers, blocked)) => {
                let context = BridgeContext {
                    device: &self.device,
                    log: self.log.as_mut(),
                    shutdown: &self.shutdown,
                    line_endings: self.profile.line_endings,
                    ceiling: self.profile.output_ceiling,
                    signal_mask: Some(&blocked),
                };
                let mut bridge = Bridge::new(context, console_in, console_out);
                let end = bridge.run().map_err(SessionError::from);
                let stats = bridge.stats();
                drop(bridge);
                drop(blocked);
                (end, stats)
            }
            Err(e) => (Err(SessionError::SignalSetup(e)), BridgeStats::default()),
        };

        state = LoopState::Draining;
        debug!(state = ?state, "Session loop exited");
        match &end {
            Ok(reason) => info!(
                reason = %reason,
                received = stats.bytes_received,
                sent = stats.bytes_sent,
                "Session ended"
            ),
            Err(e) => error!(error = %e, "Session failed"),
        }

        let log_path = self.log.as_ref().map(|log| log.path().to_path_buf());
        let teardown = self.close();

        state = LoopState::Stopped;
        debug!(state = ?state, failures = teardown.len(), "Session stopped");

        SessionOutcome {
            end,
            teardown,
            stats,
            state,
            log_path,
        }
    }

    /// Closes the log sink, then the device. Failures are collected, not raised.
    fn close(self) -> Vec<TeardownError> {
        let mut failures = Vec::new();

        if let Some(log) = self.log {
            if let Err(e) = log.close() {
                warn!(error = %e, "Teardown failure");
                failures.push(e);
            }
        }

        let path = self.device.path().to_path_buf();
        if let Err(source) = self.device.close() {
            let e = TeardownError::CloseDevice { path, source };
            warn!(error = %e, "Teardown failure");
            failures.push(e);
        }

        failures
    }
}

/// Opens a session for `profile` and runs it against the given console.
///
/// Errors before the loop starts are returned as `Err`; everything after is
/// reported in the [`SessionOutcome`].
pub fn run_session<R, W>(
    profile: SessionProfile,
    console_in: R,
    console_out: W,
) -> SessionResult<SessionOutcome>
where
    R: Read + AsFd,
    W: Write,
{
    let session = Session::open(profile)?;
    Ok(session.run(console_in, console_out))
}
