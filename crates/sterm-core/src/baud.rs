//! Supported line speeds.

use std::fmt;

use crate::error::ConfigError;

/// Default line speed when none is requested.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Every speed the line discipline can be configured with, ascending.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1_200, 1_800, 2_400, 4_800, 9_600, 19_200, 38_400,
    57_600, 115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000,
    1_500_000, 2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// A line speed known to be in [`SUPPORTED_BAUD_RATES`].
///
/// The only way to obtain one is through [`BaudRate::resolve`], so holders
/// never need to re-validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudRate(u32);

impl BaudRate {
    /// Resolves a requested speed against the supported set.
    pub fn resolve(requested: u32) -> Result<Self, ConfigError> {
        if SUPPORTED_BAUD_RATES.contains(&requested) {
            Ok(Self(requested))
        } else {
            Err(ConfigError::UnsupportedBaudRate { requested })
        }
    }

    /// Returns the speed in bits per second.
    pub fn bits_per_second(&self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(DEFAULT_BAUD_RATE)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
