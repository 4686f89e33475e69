//! sterm Serial - The serial terminal engine
//!
//! This crate provides everything between an open character device and the
//! operator's console:
//! - `discipline` - raw-mode line discipline derived from a session profile
//! - `log` - append-only mirror of inbound device bytes
//! - `shutdown` - interrupt handler that notifies the device and the loop
//! - `bridge` - readiness-multiplexed loop between device and console
//! - `session` - lifecycle: open, run, tear down exactly once
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Session                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  SerialDevice   │◀───▶│        Bridge::run          │   │
//! │  │ (raw, non-block)│     │  poll(device, console)      │   │
//! │  └────────▲────────┘     └──────┬──────────────┬───────┘   │
//! │           │ 0x03                │ inbound      │ lines     │
//! │  ┌────────┴────────┐     ┌──────▼──────┐ ┌─────▼───────┐   │
//! │  │ ShutdownBridge  │     │   LogSink   │ │ console out │   │
//! │  │ (signal handler)│     │ (optional)  │ │             │   │
//! │  └─────────────────┘     └─────────────┘ └─────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Close failures are collected and reported, never raised

pub mod bridge;
pub mod console;
pub mod device;
pub mod discipline;
pub mod log;
pub mod session;
pub mod shutdown;

pub use bridge::{Bridge, BridgeContext, BridgeStats, LoopState, SessionEnd};
pub use device::SerialDevice;
pub use log::LogSink;
pub use session::{run_session, Session, SessionOutcome};
pub use shutdown::{ShutdownBridge, ShutdownFlag, INTERRUPT_BYTE, SHUTDOWN_SIGNALS};
