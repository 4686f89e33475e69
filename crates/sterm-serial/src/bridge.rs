//! The bridge loop.
//!
//! Waits on exactly two readiness sources, the device and the console, and
//! services whichever is ready:
//!
//! ```text
//!                 ┌──────────────┐   bytes    ┌──────────────┐
//!   device ──────▶│              │───────────▶│ console out  │
//!                 │  Bridge::run │            └──────────────┘
//!                 │              │───────────▶  log sink (optional)
//!   console in ──▶│              │
//!                 └──────┬───────┘
//!                        │ transformed lines
//!                        ▼
//!                      device
//! ```
//!
//! Within one iteration the device is serviced before the console. The
//! shutdown flag is checked right before every wait, after any backoff
//! sleep, so a pending write always completes before the loop ends.
//!
//! With a [`BlockedSignals`] guard in the context the wait is a `ppoll`
//! that unblocks the shutdown signals only for its own duration. An
//! interrupt arriving anywhere else in the iteration stays pending and
//! interrupts the next wait, which sends the loop back to the flag check.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`.
//! Every exit is either a [`SessionEnd`] or a [`BridgeError`].

use std::fmt;
use std::io::{self, Read, Write};
use std::mem;
use std::os::fd::{AsFd, AsRawFd};
use std::ptr;
use std::thread;
use std::time::Duration;

use sterm_core::{is_exit_sentinel, BridgeError, LineEndings, OutputCeiling};
use tracing::{debug, info, trace};

use crate::console::{ConsoleInput, ConsoleLine};
use crate::device::SerialDevice;
use crate::log::LogSink;
use crate::shutdown::{BlockedSignals, ShutdownFlag};

/// Bytes requested per device read. The whole buffer is used; chunks are
/// forwarded as slices, so no byte is reserved for a terminator.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Delay after a readable device turns out to have nothing to read.
pub const BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of a session's loop. There is no transition back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    /// The loop has exited and teardown is in progress.
    Draining,
    Stopped,
}

/// Why the loop ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The device hung up.
    Disconnected,
    /// The operator typed the exit sentinel.
    ExitSentinel,
    /// The console reached end-of-input.
    ConsoleClosed,
    /// The output byte ceiling was reached.
    CeilingReached,
    /// A shutdown signal was received.
    Interrupted,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Disconnected => "serial port disconnected",
            Self::ExitSentinel => "exit requested",
            Self::ConsoleClosed => "console input closed",
            Self::CeilingReached => "output byte limit reached",
            Self::Interrupted => "interrupted",
        };
        f.write_str(reason)
    }
}

/// Byte counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Bytes read from the device.
    pub bytes_received: u64,
    /// Bytes written from the console to the device.
    pub bytes_sent: u64,
}

/// Readiness reported by one wait.
#[derive(Debug, Clone, Copy, Default)]
struct Readiness {
    device_readable: bool,
    device_hangup: bool,
    device_error: bool,
    console_readable: bool,
}

/// Session resources the loop borrows for its lifetime.
pub struct BridgeContext<'s> {
    pub device: &'s SerialDevice,
    pub log: Option<&'s mut LogSink>,
    pub shutdown: &'s ShutdownFlag,
    pub line_endings: LineEndings,
    pub ceiling: OutputCeiling,
    /// Shutdown signals blocked on the loop thread, if any.
    pub signal_mask: Option<&'s BlockedSignals>,
}

/// One run of the event multiplexer.
pub struct Bridge<'s, R, W> {
    device: &'s SerialDevice,
    log: Option<&'s mut LogSink>,
    shutdown: &'s ShutdownFlag,
    line_endings: LineEndings,
    ceiling: OutputCeiling,
    signal_mask: Option<&'s BlockedSignals>,
    console_in: ConsoleInput<R>,
    console_out: W,
    stats: BridgeStats,
    backoff_pending: bool,
}

impl<'s, R, W> Bridge<'s, R, W>
where
    R: Read + AsFd,
    W: Write,
{
    pub fn new(context: BridgeContext<'s>, console_in: R, console_out: W) -> Self {
        Self {
            device: context.device,
            log: context.log,
            shutdown: context.shutdown,
            line_endings: context.line_endings,
            ceiling: context.ceiling,
            signal_mask: context.signal_mask,
            console_in: ConsoleInput::new(console_in),
            console_out,
            stats: BridgeStats::default(),
            backoff_pending: false,
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Runs until a termination condition is met.
    pub fn run(&mut self) -> Result<SessionEnd, BridgeError> {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            if mem::take(&mut self.backoff_pending) {
                thread::sleep(BACKOFF);
            }

            if self.shutdown.is_requested() {
                info!("Shutdown requested");
                return Ok(SessionEnd::Interrupted);
            }

            let ready = match self.wait() {
                Ok(ready) => ready,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!("Wait interrupted by signal");
                    continue;
                }
                Err(e) => return Err(BridgeError::Wait(e)),
            };

            if ready.device_readable || ready.device_hangup {
                if let Some(end) = self.service_device(&mut buf, ready.device_hangup)? {
                    return Ok(end);
                }
            }

            if ready.device_error {
                return Err(BridgeError::DeviceFault);
            }

            if ready.console_readable {
                if let Some(end) = self.service_console()? {
                    return Ok(end);
                }
            }
        }
    }

    /// Blocks until the device or the console is ready.
    ///
    /// Does not block at all when the console already has a line buffered.
    fn wait(&self) -> io::Result<Readiness> {
        let mut fds = [
            libc::pollfd {
                fd: self.device.as_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.console_in.as_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let buffered = self.console_in.has_buffered_line();
        let nfds = fds.len() as libc::nfds_t;

        let rc = match self.signal_mask {
            Some(mask) => {
                let immediate = libc::timespec {
                    tv_sec: 0,
                    tv_nsec: 0,
                };
                let timeout = if buffered {
                    &immediate as *const libc::timespec
                } else {
                    ptr::null()
                };
                // SAFETY: `fds` is a valid pollfd array, `timeout` is null or
                // points at a live timespec, and the mask is initialised.
                unsafe { libc::ppoll(fds.as_mut_ptr(), nfds, timeout, mask.wait_mask()) }
            }
            None => {
                let timeout = if buffered { 0 } else { -1 };
                // SAFETY: `fds` is a valid array of initialised pollfd structs.
                unsafe { libc::poll(fds.as_mut_ptr(), nfds, timeout) }
            }
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let [device, console] = fds;
        Ok(Readiness {
            device_readable: device.revents & libc::POLLIN != 0,
            device_hangup: device.revents & libc::POLLHUP != 0,
            device_error: device.revents & (libc::POLLERR | libc::POLLNVAL) != 0,
            console_readable: buffered
                || console.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0,
        })
    }

    fn service_device(
        &mut self,
        buf: &mut [u8],
        hangup: bool,
    ) -> Result<Option<SessionEnd>, BridgeError> {
        let n = match self.device.read(buf) {
            Ok(0) => {
                info!(device = %self.device.path().display(), "Serial port hung up");
                return Ok(Some(SessionEnd::Disconnected));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("No data available, backing off");
                self.backoff_pending = true;
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) if hangup => {
                info!(error = %e, "Serial port hung up");
                return Ok(Some(SessionEnd::Disconnected));
            }
            Err(e) => return Err(BridgeError::DeviceRead(e)),
        };

        let chunk = buf.get(..n).unwrap_or_default();
        trace!(bytes = n, "Device data");

        self.console_out
            .write_all(chunk)
            .and_then(|()| self.console_out.flush())
            .map_err(BridgeError::ConsoleWrite)?;

        if let Some(log) = self.log.as_deref_mut() {
            log.append(chunk).map_err(BridgeError::LogWrite)?;
        }

        self.stats.bytes_received += n as u64;
        Ok(None)
    }

    fn service_console(&mut self) -> Result<Option<SessionEnd>, BridgeError> {
        let line = match self.console_in.read_line().map_err(BridgeError::ConsoleRead)? {
            ConsoleLine::Line(line) => line,
            ConsoleLine::Pending => return Ok(None),
            ConsoleLine::Eof => {
                info!("Console input closed");
                return Ok(Some(SessionEnd::ConsoleClosed));
            }
        };

        if is_exit_sentinel(&line) {
            info!("Exit sentinel received");
            return Ok(Some(SessionEnd::ExitSentinel));
        }

        let outbound = self.line_endings.outbound_line(&line);
        self.device
            .write_all(&outbound)
            .map_err(BridgeError::DeviceWrite)?;
        self.stats.bytes_sent += outbound.len() as u64;
        trace!(bytes = outbound.len(), total = self.stats.bytes_sent, "Line sent");

        if self.ceiling.is_reached(self.stats.bytes_sent) {
            info!(
                sent = self.stats.bytes_sent,
                limit = self.ceiling.limit().unwrap_or_default(),
                "Output byte limit reached"
            );
            return Ok(Some(SessionEnd::CeilingReached));
        }

        Ok(None)
    }
}
