//! Integration test for interrupt-driven shutdown.
//!
//! Lives in its own test binary because it delivers a real signal to the
//! process. SIGUSR1 stands in for SIGINT so the test harness itself is never
//! asked to stop.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::ffi::CStr;
use std::fs::{self, File};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use sterm_core::{LogTarget, SessionProfile};
use sterm_serial::{LoopState, Session, SessionEnd, INTERRUPT_BYTE};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const TIMEOUT: Duration = Duration::from_secs(5);

fn open_pty() -> (File, PathBuf) {
    // SAFETY: plain libc calls; every result is checked.
    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(fd >= 0, "posix_openpt: {}", io::Error::last_os_error());
        let master = File::from(OwnedFd::from_raw_fd(fd));
        assert_eq!(libc::grantpt(fd), 0, "grantpt");
        assert_eq!(libc::unlockpt(fd), 0, "unlockpt");

        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0, "ptsname_r");
        let slave = PathBuf::from(CStr::from_ptr(name.as_ptr()).to_str().unwrap());
        (master, slave)
    }
}

/// Drains the master until the deadline or until the slave goes away.
fn drain(master: &File, window: Duration) -> Vec<u8> {
    let deadline = Instant::now() + window;
    let mut collected = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let mut pollfd = libc::pollfd {
            fd: master.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pollfd, 1, remaining.as_millis() as libc::c_int) };
        if rc <= 0 {
            break;
        }
        let mut buf = [0u8; 64];
        let n = unsafe { libc::read(master.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n as usize]);
    }
    collected
}

/// True once `tid` has `signal` in its blocked mask, read from procfs.
fn thread_blocks(tid: libc::pid_t, signal: libc::c_int) -> bool {
    let status = fs::read_to_string(format!("/proc/self/task/{tid}/status")).unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("SigBlk:"))
        .and_then(|mask| u64::from_str_radix(mask.trim(), 16).ok())
        .is_some_and(|mask| mask & (1 << (signal - 1)) != 0)
}

#[test]
fn test_interrupt_notifies_device_once_and_tears_down() {
    let temp = tempfile::tempdir().unwrap();
    let log_path = temp.path().join("logs").join("interrupt.log");

    let (master, slave) = open_pty();
    let profile =
        SessionProfile::new(&slave).with_log_target(LogTarget::Explicit(log_path.clone()));
    let session = Session::open(profile)
        .unwrap()
        .with_shutdown_signals(&[libc::SIGUSR1]);
    assert!(!session.shutdown_flag().is_requested());

    let (console, _operator) = UnixStream::pair().unwrap();
    let console_out = console.try_clone().unwrap();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t;
        tx.send((unsafe { libc::pthread_self() }, tid)).unwrap();
        session.run(console, console_out)
    });
    let (loop_thread, tid) = rx.recv().unwrap();

    // The session blocks the signal right after installing its handler;
    // from then on a single delivery is enough.
    let start = Instant::now();
    while !thread_blocks(tid, libc::SIGUSR1) {
        assert!(start.elapsed() < TIMEOUT, "shutdown handler never installed");
        thread::sleep(POLL_INTERVAL);
    }
    assert_eq!(unsafe { libc::pthread_kill(loop_thread, libc::SIGUSR1) }, 0);

    while !handle.is_finished() {
        assert!(start.elapsed() < TIMEOUT, "loop ignored the interrupt");
        thread::sleep(POLL_INTERVAL);
    }
    let outcome = handle.join().unwrap();

    assert_eq!(outcome.end.as_ref().unwrap(), &SessionEnd::Interrupted);
    assert_eq!(outcome.state, LoopState::Stopped);
    assert!(outcome.teardown.is_empty(), "teardown: {:?}", outcome.teardown);
    assert_eq!(outcome.log_path.as_deref(), Some(log_path.as_path()));
    assert!(log_path.is_file());

    assert_eq!(drain(&master, Duration::from_millis(300)), vec![INTERRUPT_BYTE]);
}
