//! An event-driven per-connection I/O engine for TCP/UDP servers on POSIX
//! systems: an epoll/kqueue reactor, ring-buffered inbound framing, a
//! mixed ring+list outbound buffer with ordered backpressure, and a
//! bounded cross-thread task channel — the pieces a server needs between
//! "bytes are readable on a socket" and "a frame reached user code".
//!
//! Application code implements [`Handler`] and drives an [`EventLoop`];
//! everything below that line (readiness polling, buffering, partial
//! writes, the connection state machine) is this crate's job.

mod buf;
mod codec;
mod config;
mod connection;
mod error;
mod event_loop;
mod handler;
mod interest;
mod iovec;
mod poll;
mod pool;
mod sys;
mod task;
mod token;

pub use codec::{Codec, Decoded, IdentityCodec, LengthPrefixedCodec};
pub use config::LoopConfig;
pub use connection::{ConnHandle, ConnState, Connection};
pub use error::{Error, Result};
pub use event_loop::{EventLoop, UdpHandle};
pub use handler::{Action, Handler, ServerInfo};
pub use interest::{Interest, Readiness};
pub use poll::{Events, Poller};
pub use task::{Sender, Task, TaskChannel};
pub use token::Token;

/// Emits at `trace` level when the `log` feature is enabled; compiles to
/// nothing otherwise, so the hot path never formats a string when logging
/// is off.
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::trace!($($arg)*);
        }
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::debug!($($arg)*);
        }
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::warn!($($arg)*);
        }
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::error!($($arg)*);
        }
    };
}

pub(crate) use {debug, error, trace, warn};
