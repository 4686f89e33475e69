//! Line discipline configuration.
//!
//! Puts a device into raw, application-controlled mode: 8N1, no flow
//! control, no canonical processing, no echo, no signal characters. The
//! only translations left are the ones the profile asks for.
//!
//! The speed is resolved before the device is touched, so an unsupported
//! rate never changes the device's attributes.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use sterm_core::{BaudRate, ConfigError, LineEndings, SessionProfile};
use tracing::{debug, info};

/// Applies raw-mode attributes derived from `profile` to `device`.
///
/// Returns the resolved speed on success.
pub fn configure(device: &impl AsFd, profile: &SessionProfile) -> Result<BaudRate, ConfigError> {
    let baud = BaudRate::resolve(profile.baud_rate)?;
    let speed = speed_constant(baud).ok_or(ConfigError::UnsupportedBaudRate {
        requested: profile.baud_rate,
    })?;

    let fd = device.as_fd();
    let mut tty = read_attributes(fd).map_err(|source| ConfigError::DeviceAttributeFailure {
        operation: "get",
        source,
    })?;

    apply_raw_mode(&mut tty, profile.line_endings);

    // SAFETY: `tty` is a fully initialised termios obtained from tcgetattr.
    let speed_set = unsafe {
        libc::cfsetispeed(&mut tty, speed) == 0 && libc::cfsetospeed(&mut tty, speed) == 0
    };
    if !speed_set {
        return Err(ConfigError::DeviceAttributeFailure {
            operation: "set speed of",
            source: io::Error::last_os_error(),
        });
    }

    // SAFETY: valid descriptor and initialised termios.
    if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &tty) } != 0 {
        return Err(ConfigError::DeviceAttributeFailure {
            operation: "set",
            source: io::Error::last_os_error(),
        });
    }

    info!(baud = %baud, line_endings = ?profile.line_endings, "Line discipline applied");
    Ok(baud)
}

/// Reads the device's current attributes.
pub fn read_attributes(fd: BorrowedFd<'_>) -> io::Result<libc::termios> {
    let mut tty = MaybeUninit::<libc::termios>::zeroed();
    // SAFETY: tcgetattr fills the whole struct on success.
    if unsafe { libc::tcgetattr(fd.as_raw_fd(), tty.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: zero-initialised and then written by tcgetattr.
    Ok(unsafe { tty.assume_init() })
}

/// Returns the device's configured output speed in bits per second, if it
/// is one of the supported rates.
pub fn output_speed(fd: BorrowedFd<'_>) -> io::Result<Option<u32>> {
    let tty = read_attributes(fd)?;
    // SAFETY: `tty` is initialised.
    let speed = unsafe { libc::cfgetospeed(&tty) };
    Ok(sterm_core::SUPPORTED_BAUD_RATES
        .iter()
        .copied()
        .find(|&rate| {
            BaudRate::resolve(rate)
                .ok()
                .and_then(speed_constant)
                .is_some_and(|constant| constant == speed)
        }))
}

fn apply_raw_mode(tty: &mut libc::termios, endings: LineEndings) {
    // Control: 8 data bits, no parity, one stop bit, no hardware flow
    // control, receiver on, modem lines ignored, hang up on last close.
    tty.c_cflag &= !libc::CSIZE;
    tty.c_cflag |= libc::CS8;
    tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
    tty.c_cflag |= libc::CREAD | libc::CLOCAL | libc::HUPCL;

    // Local: byte-at-a-time input, no echo, no signal or extended characters.
    tty.c_lflag &= !(libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::ECHOKE
        | libc::ECHOCTL
        | libc::ISIG
        | libc::IEXTEN);

    // Input: ignore breaks, no software flow control, no byte rewriting
    // beyond the optional CR->NL map.
    tty.c_iflag |= libc::IGNBRK;
    tty.c_iflag &= !(libc::IXON
        | libc::IXOFF
        | libc::IXANY
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL);
    if endings.map_cr_to_nl_on_input {
        tty.c_iflag |= libc::ICRNL;
    }

    tty.c_oflag &= !(libc::OPOST | libc::ONLRET | libc::ONLCR);
    if endings.translates_output() {
        tty.c_oflag |= libc::OPOST;
    }
    if endings.nl_performs_cr_on_output {
        tty.c_oflag |= libc::ONLRET;
    }
    if endings.map_nl_to_crnl_on_output {
        tty.c_oflag |= libc::ONLCR;
    }

    if let Some(vmin) = tty.c_cc.get_mut(libc::VMIN) {
        *vmin = 1;
    }
    if let Some(vtime) = tty.c_cc.get_mut(libc::VTIME) {
        *vtime = 1;
    }

    debug!(
        iflag = tty.c_iflag,
        oflag = tty.c_oflag,
        cflag = tty.c_cflag,
        lflag = tty.c_lflag,
        "Raw mode attributes prepared"
    );
}

fn speed_constant(baud: BaudRate) -> Option<libc::speed_t> {
    let speed = match baud.bits_per_second() {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1_200 => libc::B1200,
        1_800 => libc::B1800,
        2_400 => libc::B2400,
        4_800 => libc::B4800,
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        500_000 => libc::B500000,
        576_000 => libc::B576000,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        2_500_000 => libc::B2500000,
        3_000_000 => libc::B3000000,
        3_500_000 => libc::B3500000,
        4_000_000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}
