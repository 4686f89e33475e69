//! Session profile handed to the engine by the command-line layer.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use crate::baud::DEFAULT_BAUD_RATE;
use crate::line_ending::LineEndings;

/// Device used when none is given.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Output ceiling applied when the ceiling flag is given without a value.
pub const DEFAULT_OUTPUT_CEILING: u64 = 1_048_576;

/// Console line that ends the session without being transmitted.
pub const EXIT_SENTINEL: &str = "~.";

/// Returns true if a console line (terminator included) is the exit sentinel.
pub fn is_exit_sentinel(line: &[u8]) -> bool {
    let body = line
        .strip_suffix(b"\n")
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .unwrap_or(line);
    body == EXIT_SENTINEL.as_bytes()
}

/// Where inbound device bytes are mirrored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[default]
    None,
    /// Log to exactly this file.
    Explicit(PathBuf),
    /// Log to a timestamped file under the invoking user's home.
    Auto,
}

impl LogTarget {
    /// Builds the target from the two command-line inputs.
    ///
    /// An explicit path always wins over the auto toggle.
    pub fn from_flags(explicit: Option<PathBuf>, auto: bool) -> Self {
        match (explicit, auto) {
            (Some(path), _) => Self::Explicit(path),
            (None, true) => Self::Auto,
            (None, false) => Self::None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Cap on the cumulative bytes written from the console to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCeiling(Option<NonZeroU64>);

impl OutputCeiling {
    pub const fn unlimited() -> Self {
        Self(None)
    }

    /// A ceiling of `bytes`; zero means unlimited.
    pub fn from_bytes(bytes: u64) -> Self {
        Self(NonZeroU64::new(bytes))
    }

    pub fn limit(&self) -> Option<u64> {
        self.0.map(NonZeroU64::get)
    }

    /// Returns true once `total` bytes sent reaches the ceiling.
    pub fn is_reached(&self, total: u64) -> bool {
        self.0.is_some_and(|limit| total >= limit.get())
    }
}

/// Everything the engine needs to run one session.
///
/// Immutable once the bridge loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub device: PathBuf,
    /// Requested speed; resolved against the supported set by the configurator.
    pub baud_rate: u32,
    pub line_endings: LineEndings,
    pub log_target: LogTarget,
    pub output_ceiling: OutputCeiling,
}

impl SessionProfile {
    /// A profile for `device` at the default speed with no translation,
    /// no log and no output ceiling.
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            line_endings: LineEndings::raw(),
            log_target: LogTarget::None,
            output_ceiling: OutputCeiling::unlimited(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_line_endings(mut self, line_endings: LineEndings) -> Self {
        self.line_endings = line_endings;
        self
    }

    pub fn with_log_target(mut self, log_target: LogTarget) -> Self {
        self.log_target = log_target;
        self
    }

    pub fn with_output_ceiling(mut self, output_ceiling: OutputCeiling) -> Self {
        self.output_ceiling = output_ceiling;
        self
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_matches_with_any_terminator() {
        assert!(is_exit_sentinel(b"~."));
        assert!(is_exit_sentinel(b"~.\n"));
        assert!(is_exit_sentinel(b"~.\r\n"));
    }

    #[test]
    fn test_sentinel_rejects_near_misses() {
        assert!(!is_exit_sentinel(b"~"));
        assert!(!is_exit_sentinel(b" ~.\n"));
        assert!(!is_exit_sentinel(b"~.\n\n"));
        assert!(!is_exit_sentinel(b"~..\n"));
        assert!(!is_exit_sentinel(b""));
    }

    #[test]
    fn test_explicit_log_wins_over_auto() {
        let target = LogTarget::from_flags(Some(PathBuf::from("/tmp/out.log")), true);
        assert_eq!(target, LogTarget::Explicit(PathBuf::from("/tmp/out.log")));
    }

    #[test]
    fn test_auto_log_target() {
        assert_eq!(LogTarget::from_flags(None, true), LogTarget::Auto);
        assert_eq!(LogTarget::from_flags(None, false), LogTarget::None);
        assert!(!LogTarget::None.is_configured());
        assert!(LogTarget::Auto.is_configured());
    }

    #[test]
    fn test_zero_ceiling_is_unlimited() {
        let ceiling = OutputCeiling::from_bytes(0);
        assert_eq!(ceiling, OutputCeiling::unlimited());
        assert_eq!(ceiling.limit(), None);
        assert!(!ceiling.is_reached(u64::MAX));
    }

    #[test]
    fn test_ceiling_reached_at_limit() {
        let ceiling = OutputCeiling::from_bytes(10);
        assert_eq!(ceiling.limit(), Some(10));
        assert!(!ceiling.is_reached(9));
        assert!(ceiling.is_reached(10));
        assert!(ceiling.is_reached(11));
    }

    #[test]
    fn test_profile_defaults() {
        let profile = SessionProfile::new(DEFAULT_DEVICE);
        assert_eq!(profile.device(), Path::new("/dev/ttyUSB0"));
        assert_eq!(profile.baud_rate, 115_200);
        assert_eq!(profile.line_endings, LineEndings::raw());
        assert_eq!(profile.log_target, LogTarget::None);
        assert_eq!(profile.output_ceiling, OutputCeiling::unlimited());
    }

    #[test]
    fn test_profile_builders() {
        let profile = SessionProfile::new("/dev/ttyS1")
            .with_baud_rate(9_600)
            .with_line_endings(LineEndings::raw().with_output_nl_as_cr(true))
            .with_log_target(LogTarget::Auto)
            .with_output_ceiling(OutputCeiling::from_bytes(DEFAULT_OUTPUT_CEILING));
        assert_eq!(profile.baud_rate, 9_600);
        assert!(profile.line_endings.nl_performs_cr_on_output);
        assert_eq!(profile.log_target, LogTarget::Auto);
        assert_eq!(profile.output_ceiling.limit(), Some(1_048_576));
    }
}
