//! Command-line arguments and Session Profile construction.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use sterm_core::{
    LineEndings, LogTarget, OutputCeiling, SessionProfile, DEFAULT_BAUD_RATE, DEFAULT_DEVICE,
};
use tracing::info;

/// Environment variable naming the device when `--device` is absent.
pub const DEVICE_VAR: &str = "STERM_DEVICE";

/// sterm - raw serial-line terminal
#[derive(Parser, Debug)]
#[command(name = "sterm", version)]
#[command(about = "Bridge a serial device and the console in raw mode")]
#[command(after_help = "Type ~. on a line by itself to end the session.")]
pub struct Args {
    /// Serial device to open [env: STERM_DEVICE] [default: /dev/ttyUSB0]
    #[arg(short = 'd', long, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Line speed in bits per second
    #[arg(short = 'b', long, value_name = "RATE", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Map CR to NL on input
    #[arg(long)]
    pub icrnl: bool,

    /// NL performs the CR function on output
    #[arg(long)]
    pub onlret: bool,

    /// Map NL to CR-NL on output
    #[arg(long)]
    pub onlcr: bool,

    /// Mirror received bytes to this file (wins over --save)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Mirror received bytes to a timestamped file under ~/.sterm/logs
    #[arg(short = 's', long)]
    pub save: bool,

    /// Stop after sending this many bytes; 0 means unlimited
    #[arg(
        short = 'm',
        long,
        value_name = "BYTES",
        num_args = 0..=1,
        default_missing_value = "1048576"
    )]
    pub max_bytes: Option<u64>,

    /// Do not clear the screen after opening the device
    #[arg(long)]
    pub no_clear: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Device path: `--device`, then `env_device`, then the built-in default.
    pub fn device_path(&self, env_device: Option<OsString>) -> PathBuf {
        self.device
            .clone()
            .or_else(|| env_device.filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE))
    }

    pub fn line_endings(&self) -> LineEndings {
        LineEndings::raw()
            .with_input_cr_to_nl(self.icrnl)
            .with_output_nl_as_cr(self.onlret)
            .with_output_nl_to_crnl(self.onlcr)
    }

    /// Log target, with an explicit path taking precedence over `--save`.
    pub fn log_target(&self) -> LogTarget {
        if self.save && self.output.is_some() {
            info!("Explicit output file given, ignoring --save");
        }
        LogTarget::from_flags(self.output.clone(), self.save)
    }

    pub fn output_ceiling(&self) -> OutputCeiling {
        self.max_bytes
            .map(OutputCeiling::from_bytes)
            .unwrap_or_else(OutputCeiling::unlimited)
    }

    /// Builds the profile, reading the device from `STERM_DEVICE` if needed.
    pub fn profile(&self) -> SessionProfile {
        self.profile_with(std::env::var_os(DEVICE_VAR))
    }

    pub fn profile_with(&self, env_device: Option<OsString>) -> SessionProfile {
        SessionProfile::new(self.device_path(env_device))
            .with_baud_rate(self.baud)
            .with_line_endings(self.line_endings())
            .with_log_target(self.log_target())
            .with_output_ceiling(self.output_ceiling())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sterm_core::DEFAULT_OUTPUT_CEILING;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("sterm").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let profile = args.profile_with(None);

        assert_eq!(profile.device, PathBuf::from(DEFAULT_DEVICE));
        assert_eq!(profile.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(profile.line_endings, LineEndings::raw());
        assert_eq!(profile.log_target, LogTarget::None);
        assert_eq!(profile.output_ceiling.limit(), None);
        assert!(!args.no_clear);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_device_precedence() {
        let args = parse(&[]);
        assert_eq!(
            args.device_path(Some("/dev/ttyACM0".into())),
            PathBuf::from("/dev/ttyACM0")
        );
        assert_eq!(args.device_path(Some("".into())), PathBuf::from(DEFAULT_DEVICE));

        let args = parse(&["-d", "/dev/ttyS1"]);
        assert_eq!(
            args.device_path(Some("/dev/ttyACM0".into())),
            PathBuf::from("/dev/ttyS1")
        );
    }

    #[test]
    fn test_line_ending_flags_are_independent() {
        let endings = parse(&["--onlret", "--onlcr"]).line_endings();
        assert!(!endings.map_cr_to_nl_on_input);
        assert!(endings.nl_performs_cr_on_output);
        assert!(endings.map_nl_to_crnl_on_output);

        let endings = parse(&["--icrnl"]).line_endings();
        assert!(endings.map_cr_to_nl_on_input);
        assert!(!endings.translates_output());
    }

    #[test]
    fn test_explicit_output_wins_over_save() {
        let target = parse(&["-s", "-o", "/tmp/capture.log"]).log_target();
        assert_eq!(target, LogTarget::Explicit(PathBuf::from("/tmp/capture.log")));

        assert_eq!(parse(&["--save"]).log_target(), LogTarget::Auto);
    }

    #[test]
    fn test_max_bytes_without_value_uses_default() {
        let ceiling = parse(&["-m"]).output_ceiling();
        assert_eq!(ceiling.limit(), Some(DEFAULT_OUTPUT_CEILING));

        // Flag followed by another flag still takes the default.
        let args = parse(&["--max-bytes", "-s"]);
        assert_eq!(args.output_ceiling().limit(), Some(DEFAULT_OUTPUT_CEILING));
        assert!(args.save);
    }

    #[test]
    fn test_max_bytes_explicit_and_zero() {
        assert_eq!(parse(&["-m", "4096"]).output_ceiling().limit(), Some(4096));
        assert_eq!(parse(&["--max-bytes=0"]).output_ceiling().limit(), None);
    }

    #[test]
    fn test_baud_is_passed_through_unvalidated() {
        // Rate validation belongs to the line discipline.
        let profile = parse(&["-b", "12345"]).profile_with(None);
        assert_eq!(profile.baud_rate, 12_345);
    }

    #[test]
    fn test_verbose_counts() {
        assert_eq!(parse(&["-vv"]).verbose, 2);
        assert_eq!(parse(&["-v", "--verbose"]).verbose, 2);
    }

    #[test]
    fn test_usage_errors() {
        let err = Args::try_parse_from(["sterm", "-b", "fast"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = Args::try_parse_from(["sterm", "--bogus"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
