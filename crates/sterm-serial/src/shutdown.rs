//! Shutdown signal bridge.
//!
//! An interrupt does two things and nothing else: it writes a single ETX
//! byte (`0x03`) to the device, and it raises the [`ShutdownFlag`]. Both
//! happen inside the signal handler, so the handler only touches an atomic
//! and issues one raw `write(2)`. It never allocates or takes a lock.
//!
//! Termination itself is decided by the bridge loop, which checks the flag
//! at the top of every iteration.
//!
//! The flag is idempotent: a second interrupt during shutdown neither
//! writes another byte nor skips teardown.
//!
//! [`BlockedSignals`] keeps the shutdown signals pending on the loop thread
//! everywhere except inside the readiness wait, so an interrupt that lands
//! while the loop is busy or sleeping still wakes the next wait.

use std::io;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::consts::FORBIDDEN;
use signal_hook::SigId;
use tracing::debug;

use crate::device::SerialDevice;

/// Control byte sent to the device on interrupt.
pub const INTERRUPT_BYTE: u8 = 0x03;

/// Signals that end a session.
pub const SHUTDOWN_SIGNALS: &[libc::c_int] = &[SIGINT, SIGTERM];

/// Process-lifetime shutdown request, shared between the handler and the loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns true only for the call that raised it.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Installed interrupt handlers for one session.
///
/// Holds its own duplicate of the device descriptor so the handler never
/// writes to a descriptor number the session has already closed. Dropping
/// the bridge unregisters the handlers before closing the duplicate.
#[derive(Debug)]
pub struct ShutdownBridge {
    ids: Vec<SigId>,
    _notify_fd: OwnedFd,
}

impl ShutdownBridge {
    /// Registers the interrupt action for each of `signals`.
    ///
    /// Signals that cannot carry a handler (`SIGKILL`, `SIGSTOP`, `SIGSEGV`,
    /// `SIGILL`, `SIGFPE`) are rejected with `InvalidInput` before anything
    /// is registered.
    pub fn install(
        flag: &ShutdownFlag,
        device: &SerialDevice,
        signals: &[libc::c_int],
    ) -> io::Result<Self> {
        if let Some(signal) = signals.iter().find(|&s| FORBIDDEN.contains(s)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("signal {signal} cannot be used for shutdown"),
            ));
        }

        let notify_fd = device.try_clone_fd()?;
        let raw = notify_fd.as_raw_fd();

        let mut bridge = Self {
            ids: Vec::with_capacity(signals.len()),
            _notify_fd: notify_fd,
        };

        for &signal in signals {
            let flag = flag.clone();
            // SAFETY: the action only performs an atomic swap and a single
            // write(2), both async-signal-safe.
            let id =
                unsafe { signal_hook::low_level::register(signal, move || notify(&flag, raw)) }?;
            bridge.ids.push(id);
            debug!(signal, "Shutdown handler installed");
        }

        Ok(bridge)
    }
}

impl Drop for ShutdownBridge {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Shutdown signals blocked on the calling thread.
///
/// While this guard lives the signals stay pending on this thread instead
/// of being delivered. [`BlockedSignals::wait_mask`] is the mask to install
/// atomically for the duration of the readiness wait (`ppoll`), which is
/// the only place they are let through. Dropping the guard restores the
/// previous mask. The guard is tied to the thread that created it.
pub struct BlockedSignals {
    previous: libc::sigset_t,
    during_wait: libc::sigset_t,
    _thread_bound: PhantomData<*const ()>,
}

impl BlockedSignals {
    pub fn block(signals: &[libc::c_int]) -> io::Result<Self> {
        let mut blocked = empty_set()?;
        for &signal in signals {
            // SAFETY: `blocked` is an initialised sigset_t.
            if unsafe { libc::sigaddset(&mut blocked, signal) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        let mut previous = empty_set()?;
        // SAFETY: both sets are initialised; pthread_sigmask returns the
        // error number instead of setting errno.
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &blocked, &mut previous) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }

        let mut during_wait = previous;
        for &signal in signals {
            // SAFETY: `during_wait` is initialised and `signal` was accepted
            // by sigaddset above.
            unsafe { libc::sigdelset(&mut during_wait, signal) };
        }

        debug!(count = signals.len(), "Shutdown signals blocked outside the wait");
        Ok(Self {
            previous,
            during_wait,
            _thread_bound: PhantomData,
        })
    }

    /// The thread's original mask minus the shutdown signals.
    pub fn wait_mask(&self) -> &libc::sigset_t {
        &self.during_wait
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        // SAFETY: restores a mask obtained from pthread_sigmask.
        unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut()) };
    }
}

fn empty_set() -> io::Result<libc::sigset_t> {
    let mut set = MaybeUninit::<libc::sigset_t>::zeroed();
    // SAFETY: sigemptyset initialises the whole set.
    if unsafe { libc::sigemptyset(set.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: initialised above.
    Ok(unsafe { set.assume_init() })
}

/// The interrupt action: raise the flag and, the first time only, send ETX.
///
/// The write is best effort. A full or disconnected device loses the byte.
pub fn notify(flag: &ShutdownFlag, device_fd: RawFd) {
    if flag.request() {
        // SAFETY: writes one byte from a static; the result is ignored.
        unsafe {
            libc::write(
                device_fd,
                (&INTERRUPT_BYTE as *const u8).cast::<libc::c_void>(),
                1,
            );
        }
    }
}
