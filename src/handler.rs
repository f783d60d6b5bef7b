//! User-handler contract (spec §4.7 "External User-Handler Contract").
//!
//! Implemented as a trait with default no-op bodies for every hook but
//! `react`, covering this spec's open/close/write/tick lifecycle with a
//! `&mut Connection<C>` handle per spec §6.

use std::net::SocketAddr;
use std::time::Duration;

use crate::connection::Connection;
use crate::error::Error;

/// What the loop should do after a handler callback returns.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Action {
    /// Continue normally.
    #[default]
    None,
    /// Close the connection the callback fired on.
    Close,
    /// Terminate this loop (and, via the orchestrator, its siblings).
    Shutdown,
}

/// Information about the loop a handler is attached to, passed to the
/// once-per-lifetime `on_init_complete`/`on_shutdown` hooks.
#[derive(Copy, Clone, Debug)]
pub struct ServerInfo {
    pub loop_index: usize,
}

/// The callback set a loop invokes, always on its own thread (spec §5
/// "user callbacks run to completion before the next event is handled").
///
/// `C` is the per-connection opaque context type threaded through
/// [`Connection`]; every hook but `react` has a no-op default so a handler
/// only implements what it needs.
pub trait Handler<C>: Send {
    /// Called once, before the loop accepts its first connection.
    fn on_init_complete(&mut self, _info: ServerInfo) {}

    /// Called once, after the loop has stopped accepting and closed every
    /// connection.
    fn on_shutdown(&mut self, _info: ServerInfo) {}

    /// Called once a connection reaches `Open`. May return bytes to write
    /// immediately.
    fn on_opened(&mut self, _conn: &mut Connection<C>) -> (Option<Vec<u8>>, Action) {
        (None, Action::None)
    }

    /// Called once, when a connection leaves `Open`. `err` is `Some` for a
    /// peer reset, decode failure, or I/O error; `None` for a clean local
    /// close.
    fn on_closed(&mut self, _conn: &mut Connection<C>, _err: Option<&Error>) -> Action {
        Action::None
    }

    /// Instrumentation hook fired immediately before bytes are handed to
    /// the outbound buffer.
    fn pre_write(&mut self, _conn: &mut Connection<C>) {}

    /// Instrumentation hook fired after bytes have been accepted into the
    /// outbound buffer (not necessarily transmitted yet).
    fn after_write(&mut self, _conn: &mut Connection<C>, _bytes: &[u8]) {}

    /// The primary callback: fired once per decoded frame, and once with
    /// an empty frame per foreign-thread `Wake()`. May return bytes to
    /// write back.
    fn react(&mut self, frame: &[u8], conn: &mut Connection<C>) -> (Option<Vec<u8>>, Action);

    /// The UDP counterpart of `react` (spec §4.6 "UDP path"): there is no
    /// per-fd connection registry for datagrams, so the remote address is
    /// passed directly instead of a `Connection` handle. Bytes returned
    /// are sent back to `remote` via `SendTo`.
    fn react_datagram(&mut self, _frame: &[u8], _remote: SocketAddr) -> (Option<Vec<u8>>, Action) {
        (None, Action::None)
    }

    /// Polled on the configured tick interval. A `Some` delay reschedules
    /// the next tick at that offset; `None` stops ticking until something
    /// else requests it again.
    fn tick(&mut self) -> (Option<Duration>, Action) {
        (None, Action::None)
    }
}
