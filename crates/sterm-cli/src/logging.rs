//! Tracing setup.
//!
//! Diagnostics go to stderr; stdout carries the device byte stream and must
//! stay clean.

use tracing_subscriber::EnvFilter;

/// Crates whose level `-v` raises.
const CRATES: &[&str] = &["sterm", "sterm_cli", "sterm_serial", "sterm_core"];

/// Default filter directives for the given `-v` count.
pub fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// defaults entirely.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    // A subscriber may already be installed by an embedding test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
