//! sterm CLI - command-line front end
//!
//! Turns command-line flags into a [`SessionProfile`], opens the session,
//! prints the banner and hands the console to the engine. Once the session
//! ends it reports what happened on stderr and picks the exit status.
//!
//! # Usage
//!
//! ```text
//! sterm                          # /dev/ttyUSB0 at 115200
//! sterm -d /dev/ttyACM0 -b 9600  # another port and speed
//! sterm -s                       # mirror to ~/.sterm/logs/sterm-<time>.log
//! sterm -o boot.log -m           # explicit log, stop after 1 MiB sent
//! STERM_DEVICE=/dev/ttyS0 sterm  # device from the environment
//! RUST_LOG=sterm_serial=debug sterm
//! ```
//!
//! # Exit Status
//!
//! - `0` - the session ended normally (sentinel, console EOF, hang-up,
//!   output ceiling, interrupt)
//! - `1` - a fatal error, or a resource failed to close
//! - `2` - command-line usage error

pub mod args;
pub mod logging;

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use sterm_core::{BaudRate, SessionProfile, EXIT_SENTINEL};
use sterm_serial::{Session, SessionEnd, SessionOutcome};
use tracing::{info, warn};

pub use args::Args;

/// Erase display, cursor home.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Runs one session end to end.
///
/// Errors before the loop starts are returned; everything after is
/// reported on stderr and folded into the exit code.
pub fn run(args: Args) -> Result<ExitCode> {
    logging::init_tracing(args.verbose);

    let profile = args.profile();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %profile.device.display(),
        baud = profile.baud_rate,
        "sterm starting"
    );

    // Read the console through our own descriptor; `Stdin` buffers
    // internally and would hide pending lines from the readiness wait.
    let console_in = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map(File::from)
        .context("Failed to duplicate console input")?;

    let session = open_session(profile)?;
    let status = start(
        session,
        console_in,
        io::stdout().lock(),
        &mut io::stderr(),
        !args.no_clear,
    );
    Ok(ExitCode::from(status))
}

/// Announces an open session, runs it and reports the outcome.
///
/// Once a session is open it always reaches [`Session::run`], so its
/// resources are torn down and close failures reported even when the
/// banner cannot be written.
pub fn start<R, W, E>(
    session: Session,
    console_in: R,
    mut console_out: W,
    diagnostics: &mut E,
    clear: bool,
) -> u8
where
    R: Read + AsFd,
    W: Write,
    E: Write,
{
    if let Err(e) = announce(&session, &mut console_out, diagnostics, clear) {
        warn!(error = %e, "Failed to write session banner");
    }
    let outcome = session.run(console_in, console_out);
    report(&outcome, diagnostics)
}

fn announce(
    session: &Session,
    console_out: &mut impl Write,
    diagnostics: &mut impl Write,
    clear: bool,
) -> io::Result<()> {
    write_banner(diagnostics, session.profile().device(), session.baud())?;
    if clear {
        console_out.write_all(CLEAR_SCREEN)?;
        console_out.flush()?;
    }
    writeln!(diagnostics, "Type {EXIT_SENTINEL} on a line by itself to exit.")
}

fn open_session(profile: SessionProfile) -> Result<Session> {
    let device = profile.device.clone();
    Session::open(profile)
        .with_context(|| format!("Failed to start session on {}", device.display()))
}

/// Prints the line announcing a successfully opened port.
pub fn write_banner(out: &mut impl Write, device: &Path, baud: BaudRate) -> io::Result<()> {
    writeln!(
        out,
        "Serial port {} opened successfully at {} baud.",
        device.display(),
        baud
    )
}

/// Prints the end-of-session notices and returns the exit status.
pub fn report(outcome: &SessionOutcome, out: &mut impl Write) -> u8 {
    // Best effort: stderr may already be gone.
    let _ = write_report(outcome, out);
    exit_status(outcome)
}

fn write_report(outcome: &SessionOutcome, out: &mut impl Write) -> io::Result<()> {
    match &outcome.end {
        Ok(SessionEnd::Disconnected) => writeln!(out, "\r\nSerial port disconnected.")?,
        Ok(SessionEnd::CeilingReached) => writeln!(out, "\r\nOutput limit reached.")?,
        Ok(SessionEnd::Interrupted) => writeln!(out, "\r\nInterrupted.")?,
        Ok(SessionEnd::ExitSentinel | SessionEnd::ConsoleClosed) => {}
        Err(e) => writeln!(out, "\r\nError: {e}")?,
    }

    for failure in &outcome.teardown {
        writeln!(out, "Error: {failure}")?;
    }

    if let Some(path) = &outcome.log_path {
        writeln!(out, "Received data saved to {}", path.display())?;
    }
    Ok(())
}

/// `0` when the loop ended normally and every resource closed, else `1`.
pub fn exit_status(outcome: &SessionOutcome) -> u8 {
    if outcome.is_success() {
        0
    } else {
        1
    }
}
