//! Error taxonomy for a terminal session.
//!
//! Errors are grouped by the phase that produces them:
//! - [`ConfigError`] - line discipline setup, fatal before the loop starts
//! - [`ResourceError`] - log target resolution and creation, fatal before the loop starts
//! - [`BridgeError`] - I/O failures inside the bridge loop, fatal to the loop
//! - [`TeardownError`] - close failures, reported but never escalated
//!
//! Every variant that wraps an [`io::Error`] renders the OS message together
//! with its numeric code (`... (os error 5)`), so diagnostics always identify
//! the failing operation and the underlying cause.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Line discipline configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The requested speed is not in the supported set.
    #[error("Unsupported baud rate: {requested}")]
    UnsupportedBaudRate { requested: u32 },

    /// Reading or writing the device attributes failed.
    #[error("Failed to {operation} serial port attributes: {source}")]
    DeviceAttributeFailure {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Log target resolution and creation failures.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Neither the sudo-invoking user nor the current user has a resolvable home.
    #[error("Could not determine home directory for the auto log target")]
    NoHomeDirectory,

    /// A non-directory file sits where a directory is needed.
    #[error("Path conflict: {path} exists and is not a directory")]
    PathConflict { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fatal I/O failures inside the bridge loop.
///
/// The recoverable "no data right now" condition is never represented here;
/// the loop handles it with a backoff.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to wait for readiness: {0}")]
    Wait(#[source] io::Error),

    #[error("Failed to read from serial port: {0}")]
    DeviceRead(#[source] io::Error),

    #[error("Failed to write to serial port: {0}")]
    DeviceWrite(#[source] io::Error),

    /// The readiness wait reported an error condition on the device.
    #[error("Serial port reported an error condition")]
    DeviceFault,

    #[error("Failed to read from console: {0}")]
    ConsoleRead(#[source] io::Error),

    #[error("Failed to write to console: {0}")]
    ConsoleWrite(#[source] io::Error),

    #[error("Failed to write to log file: {0}")]
    LogWrite(#[source] io::Error),
}

/// Close failures during teardown.
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("Failed to close log file {path}: {source}")]
    CloseLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to close serial port {path}: {source}")]
    CloseDevice {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Any failure that ends a session before or during the bridge loop.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to open serial port {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to install shutdown handler: {0}")]
    SignalSetup(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_baud_display() {
        let err = ConfigError::UnsupportedBaudRate { requested: 12345 };
        assert_eq!(err.to_string(), "Unsupported baud rate: 12345");
    }

    #[test]
    fn test_attribute_failure_carries_os_code() {
        let err = ConfigError::DeviceAttributeFailure {
            operation: "get",
            source: io::Error::from_raw_os_error(25),
        };
        let display = err.to_string();
        assert!(display.contains("Failed to get serial port attributes"));
        assert!(display.contains("os error 25"));
    }

    #[test]
    fn test_path_conflict_display() {
        let err = ResourceError::PathConflict {
            path: PathBuf::from("/tmp/logs"),
        };
        assert!(err.to_string().contains("/tmp/logs"));
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_session_error_from_config() {
        let err: SessionError = ConfigError::UnsupportedBaudRate { requested: 7 }.into();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(err.to_string(), "Unsupported baud rate: 7");
    }

    #[test]
    fn test_session_error_from_bridge() {
        let err: SessionError =
            BridgeError::DeviceRead(io::Error::from_raw_os_error(5)).into();
        assert!(matches!(err, SessionError::Bridge(BridgeError::DeviceRead(_))));
        assert!(err.to_string().contains("os error 5"));
    }

    #[test]
    fn test_teardown_error_display() {
        let err = TeardownError::CloseDevice {
            path: PathBuf::from("/dev/ttyUSB0"),
            source: io::Error::from_raw_os_error(9),
        };
        let display = err.to_string();
        assert!(display.contains("/dev/ttyUSB0"));
        assert!(display.contains("os error 9"));
    }
}
