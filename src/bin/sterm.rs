//! sterm - raw serial-line terminal
//!
//! Opens a serial device in raw mode and bridges it with the console.
//! Received bytes go to stdout (and optionally a log file); each line typed
//! on stdin is sent to the device. Type `~.` on a line by itself to exit.
//!
//! # Usage
//!
//! ```bash
//! # Default port and speed
//! sterm
//!
//! # Another port, 9600 baud, NL sent as CR
//! sterm -d /dev/ttyACM0 -b 9600 --onlret
//!
//! # Keep a timestamped capture under ~/.sterm/logs
//! sterm -s
//! ```
//!
//! # Signal Handling
//!
//! - SIGINT/SIGTERM: send ETX (0x03) to the device, then shut down cleanly

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use sterm_cli::Args;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    sterm_cli::run(args)
}
