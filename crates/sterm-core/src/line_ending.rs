//! Line-ending translation policy.
//!
//! The three capabilities are independent: any combination is accepted and
//! passed to the device as-is. Combining them sensibly is up to the operator.

use std::borrow::Cow;

/// Line-ending translations requested for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineEndings {
    /// Map carriage return to newline on input (`ICRNL`).
    pub map_cr_to_nl_on_input: bool,

    /// Newline performs the carriage-return function on output (`ONLRET`).
    pub nl_performs_cr_on_output: bool,

    /// Map newline to carriage return + newline on output (`ONLCR`).
    pub map_nl_to_crnl_on_output: bool,
}

impl LineEndings {
    /// No translation in either direction.
    pub const fn raw() -> Self {
        Self {
            map_cr_to_nl_on_input: false,
            nl_performs_cr_on_output: false,
            map_nl_to_crnl_on_output: false,
        }
    }

    pub const fn with_input_cr_to_nl(mut self, enabled: bool) -> Self {
        self.map_cr_to_nl_on_input = enabled;
        self
    }

    pub const fn with_output_nl_as_cr(mut self, enabled: bool) -> Self {
        self.nl_performs_cr_on_output = enabled;
        self
    }

    pub const fn with_output_nl_to_crnl(mut self, enabled: bool) -> Self {
        self.map_nl_to_crnl_on_output = enabled;
        self
    }

    /// Returns true if any output-side translation is requested.
    pub fn translates_output(&self) -> bool {
        self.nl_performs_cr_on_output || self.map_nl_to_crnl_on_output
    }

    /// Rewrites the terminator of a console line before it goes to the device.
    ///
    /// A plain trailing `\n` becomes `\r` when an output translation is
    /// requested. A `\r\n` terminator, a line without a terminator, and any
    /// line under [`LineEndings::raw`] output are sent unchanged.
    pub fn outbound_line<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        if !self.translates_output() {
            return Cow::Borrowed(line);
        }

        match line.split_last() {
            Some((b'\n', body)) if !body.ends_with(b"\r") => {
                let mut translated = Vec::with_capacity(line.len());
                translated.extend_from_slice(body);
                translated.push(b'\r');
                Cow::Owned(translated)
            }
            _ => Cow::Borrowed(line),
        }
    }
}
