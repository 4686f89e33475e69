//! sterm Core - Shared types for the serial terminal
//!
//! This crate provides the domain types shared between the engine
//! (sterm-serial) and the command-line front end (sterm-cli).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod baud;
pub mod error;
pub mod line_ending;
pub mod profile;

// Re-exports for convenience
pub use baud::{BaudRate, DEFAULT_BAUD_RATE, SUPPORTED_BAUD_RATES};
pub use error::{
    BridgeError, ConfigError, ResourceError, SessionError, SessionResult, TeardownError,
};
pub use line_ending::LineEndings;
pub use profile::{
    is_exit_sentinel, LogTarget, OutputCeiling, SessionProfile, DEFAULT_DEVICE,
    DEFAULT_OUTPUT_CEILING, EXIT_SENTINEL,
};
