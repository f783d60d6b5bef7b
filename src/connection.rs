//! Per-connection state (spec §3 "Connection", §6 "Connection interface").
//!
//! Splits the socket itself from everything the loop needs to drive it:
//! both live in one struct owned
//! exclusively by the loop thread. Thread-safe operations never touch this
//! struct directly; they go through a [`ConnHandle`], which only carries a
//! [`Token`] and a type-erased sink back to the owning loop.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::buf::{OutboundBuffer, RingBuffer};
use crate::config::LoopConfig;
use crate::error::{Error, Result};
use crate::interest::Interest;
use crate::iovec;
use crate::token::Token;

/// Connection lifecycle (spec §4.6 state machine). Transitions into
/// `Closing` are idempotent; the loop guards against acting on a
/// connection that has already left `Open`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnState {
    New,
    Opening,
    Open,
    Closing,
    Closed,
}

/// What the loop should do after draining a socket's readable side.
pub(crate) enum FillOutcome {
    /// At least one byte was appended to the inbound ring.
    Filled,
    /// Nothing more to read right now; not an error.
    WouldBlock,
    /// The peer closed its write half (a zero-length read).
    PeerClosed,
}

/// What the loop should do after attempting to drain the outbound buffer.
pub(crate) enum FlushOutcome {
    /// Every buffered byte was handed to the kernel; write interest can be
    /// dropped.
    Drained,
    /// Some bytes remain buffered; keep write interest armed.
    Partial,
    /// The kernel isn't ready for more right now.
    WouldBlock,
}

/// Operations a [`ConnHandle`] needs from its owning loop, erased over the
/// loop's handler type so `Connection<C>`/`ConnHandle<C>` never have to
/// name it. One concrete impl lives in `event_loop.rs`, built on top of a
/// [`crate::task::Sender`].
pub(crate) trait LoopSink<C>: Send + Sync {
    fn async_write(&self, token: Token, bytes: Vec<u8>) -> Result<()>;
    fn wake(&self, token: Token) -> Result<()>;
    fn close(&self, token: Token) -> Result<()>;
}

/// A cheaply cloneable, thread-safe reference to one connection, usable
/// from any thread (spec §6 "Thread-safe" operations: `AsyncWrite`, `Wake`,
/// `Close`).
pub struct ConnHandle<C> {
    token: Token,
    sink: Arc<dyn LoopSink<C>>,
}

impl<C> Clone for ConnHandle<C> {
    fn clone(&self) -> ConnHandle<C> {
        ConnHandle {
            token: self.token,
            sink: self.sink.clone(),
        }
    }
}

impl<C> ConnHandle<C> {
    pub(crate) fn new(token: Token, sink: Arc<dyn LoopSink<C>>) -> ConnHandle<C> {
        ConnHandle { token, sink }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Schedules `bytes` to be appended to this connection's outbound
    /// buffer on the owning loop's thread and, if idle, written
    /// immediately. Ownership of `bytes` transfers to the task (spec §4.6
    /// "AsyncWrite").
    pub fn async_write(&self, bytes: Vec<u8>) -> Result<()> {
        self.sink.async_write(self.token, bytes)
    }

    /// Invokes `Handler::react` on the owning loop with an empty frame,
    /// purely for signalling (spec §4.6 "Wake").
    pub fn wake(&self) -> Result<()> {
        self.sink.wake(self.token)
    }

    /// Closes the connection from any thread (spec §4.6 "Close"). Safe to
    /// call more than once; later calls observe the idempotent close path.
    pub fn close(&self) -> Result<()> {
        self.sink.close(self.token)
    }
}

/// One TCP endpoint owned by a single [`crate::EventLoop`].
///
/// `C` is the opaque per-connection user context (spec §9 "Opaque user
/// context"): a generic parameter rather than `Box<dyn Any>`.
pub struct Connection<C> {
    stream: TcpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    state: ConnState,
    inbound: RingBuffer,
    /// Linearized copy of the most recent wrap-spanning `read_n`/`read`,
    /// keyed by the length it was built for so a repeated read of the same
    /// range can reuse it instead of re-peeking across the wrap. Cleared on
    /// every `shift_n` (spec §3 "invalidated by any discard"); since it is
    /// `None` rather than merely empty, this also satisfies the decision to
    /// release (not just truncate) it whenever the inbound ring drains (§9
    /// resolved Open Question).
    transit: Option<(usize, Vec<u8>)>,
    outbound: OutboundBuffer,
    armed_interest: Interest,
    /// Set when a handler callback returned `Action::Close` while the
    /// outbound buffer still held unflushed bytes (spec §8 "close during
    /// write": the response must reach the peer before the fd closes).
    /// The loop checks this after every successful flush and closes once
    /// it drains to empty instead of closing immediately.
    pending_close: bool,
    context: C,
    handle: ConnHandle<C>,
}

impl<C> Connection<C> {
    pub(crate) fn new(
        stream: TcpStream,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        config: &LoopConfig,
        context: C,
        handle: ConnHandle<C>,
    ) -> Connection<C> {
        let inbound_capacity = config.initial_ring_capacity.max(1).next_power_of_two();
        let inbound_storage = crate::pool::inbound_ring_pool().acquire(inbound_capacity);
        Connection {
            stream,
            local_addr,
            remote_addr,
            state: ConnState::New,
            inbound: RingBuffer::with_storage(inbound_storage, inbound_capacity, config.max_ring_capacity),
            transit: None,
            outbound: OutboundBuffer::new(config.outbound_ring_capacity, config.max_outbound_bytes),
            armed_interest: Interest::READABLE,
            pending_close: false,
            context,
            handle,
        }
    }

    // -- spec §6 Connection interface (loop-thread only) --------------

    /// Returns every currently buffered, not-yet-consumed byte.
    pub fn read(&mut self) -> Vec<u8> {
        let len = self.inbound.len();
        self.read_n(len).1
    }

    /// Returns up to `n` buffered bytes; the first element of the tuple is
    /// `true` iff at least `n` bytes were available (spec `ReadN(n) →
    /// (have, bytes)`).
    pub fn read_n(&mut self, n: usize) -> (bool, Vec<u8>) {
        let available = self.inbound.len();
        let have = n <= available;
        let take = n.min(available);

        if let Some((cached_len, cached)) = &self.transit {
            if *cached_len == take {
                return (have, cached.clone());
            }
        }

        let (head, tail) = self.inbound.peek(take);
        let mut out = Vec::with_capacity(take);
        out.extend_from_slice(head);
        out.extend_from_slice(tail);
        if !tail.is_empty() {
            self.transit = Some((take, out.clone()));
        }
        (have, out)
    }

    /// Advances the inbound read cursor by `min(n, buffer_length())`.
    pub fn shift_n(&mut self, n: usize) -> usize {
        let discarded = self.inbound.discard(n);
        self.transit = None;
        discarded
    }

    pub fn buffer_length(&self) -> usize {
        self.inbound.len()
    }

    /// Clears the inbound buffer without discarding via the codec.
    pub fn reset_buffer(&mut self) {
        self.inbound.reset();
        self.transit = None;
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn set_context(&mut self, context: C) {
        self.context = context;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// A cloneable, thread-safe handle for `AsyncWrite`/`Wake`/`Close`.
    pub fn handle(&self) -> ConnHandle<C> {
        self.handle.clone()
    }

    // -- loop-internal plumbing ----------------------------------------

    pub(crate) fn state(&self) -> ConnState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    pub(crate) fn armed_interest(&self) -> Interest {
        self.armed_interest
    }

    pub(crate) fn set_armed_interest(&mut self, interest: Interest) {
        self.armed_interest = interest;
    }

    /// The interest mask the registration *should* carry right now (spec
    /// §8 invariant: write interest iff the outbound buffer is non-empty).
    pub(crate) fn desired_interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE_WRITABLE
        }
    }

    pub(crate) fn raw_fd(&self) -> i32 {
        iovec::raw_fd_of(&self.stream)
    }

    pub(crate) fn pending_close(&self) -> bool {
        self.pending_close
    }

    pub(crate) fn set_pending_close(&mut self, pending: bool) {
        self.pending_close = pending;
    }

    pub(crate) fn outbound_is_empty(&self) -> bool {
        self.outbound.is_empty()
    }

    /// Buffers `bytes` for write, or writes them immediately if the
    /// outbound buffer was empty (spec §4.6 "Synchronous write path").
    /// Returns the armed-interest the caller must reconcile with the
    /// poller.
    pub(crate) fn enqueue_write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.outbound.is_empty() {
            return self.outbound.write(bytes);
        }

        let n = iovec::write_vectored(&mut self.stream, &[io::IoSlice::new(bytes)])?;
        if n < bytes.len() {
            self.outbound.write(&bytes[n..])?;
        }
        Ok(())
    }

    /// Drains the socket's readable side into the inbound ring until
    /// `EAGAIN` or a short read (spec §4.6 `handleRead` step 1-2).
    pub(crate) fn fill_from_socket(&mut self, read_overflow: usize) -> Result<FillOutcome> {
        let mut any = false;
        loop {
            let free = self.inbound.capacity().saturating_sub(self.inbound.len());
            let want = free.max(read_overflow);
            let mut scratch = vec![0u8; want];
            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    return Ok(if any {
                        FillOutcome::Filled
                    } else {
                        FillOutcome::PeerClosed
                    });
                }
                Ok(n) => {
                    self.inbound.write(&scratch[..n])?;
                    any = true;
                    if n < want {
                        return Ok(FillOutcome::Filled);
                    }
                    // Scratch filled completely; there may be more.
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(if any {
                        FillOutcome::Filled
                    } else {
                        FillOutcome::WouldBlock
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::PeerClosed(e)),
            }
        }
    }

    /// Attempts to drain the outbound buffer in one scatter/gather write
    /// (spec §4.6 `handleWrite`).
    pub(crate) fn flush_outbound(&mut self) -> Result<FlushOutcome> {
        if self.outbound.is_empty() {
            return Ok(FlushOutcome::Drained);
        }

        let mut scratch = Vec::new();
        let iovecs = self.outbound.peek_iovecs(&mut scratch);
        if iovecs.is_empty() {
            return Ok(FlushOutcome::Drained);
        }

        let n = match iovec::write_vectored(&mut self.stream, iovecs) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(FlushOutcome::WouldBlock)
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if n == 0 {
            return Ok(FlushOutcome::WouldBlock);
        }

        self.outbound.discard(n);
        if self.outbound.is_empty() {
            Ok(FlushOutcome::Drained)
        } else {
            Ok(FlushOutcome::Partial)
        }
    }

    pub(crate) fn release_buffers(&mut self) {
        crate::pool::inbound_ring_pool().release(self.inbound.take_storage());
        self.transit = None;
        self.outbound.release();
    }
}
