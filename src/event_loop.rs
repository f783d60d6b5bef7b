//! The reactor core (spec §2 component 6, §4.6 "Event Loop").
//!
//! Owns a [`Poller`], a [`TaskChannel`], and a `slab`-backed connection
//! registry; drives the per-connection state machine; dispatches readiness
//! events to the user [`Handler`]. One OS thread, one poller, strictly
//! sequential dispatch, driving this spec's open/react/write/close
//! lifecycle.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use slab::Slab;
use socket2::{Domain, Protocol, Socket, Type};

use crate::codec::{Codec, Decoded, IdentityCodec};
use crate::config::LoopConfig;
use crate::connection::{ConnHandle, ConnState, Connection, FillOutcome, FlushOutcome, LoopSink};
use crate::error::{Error, Result};
use crate::handler::{Action, Handler, ServerInfo};
use crate::interest::Interest;
use crate::iovec;
use crate::poll::{Events, Poller};
use crate::task::{Sender, TaskChannel};
use crate::token::{Token, WAKE_TOKEN};

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
const UDP_TOKEN: Token = Token(usize::MAX - 2);

struct LoopSinkImpl<H, C> {
    sender: Sender<EventLoop<H, C>>,
}

impl<H, C> LoopSink<C> for LoopSinkImpl<H, C>
where
    H: Handler<C> + 'static,
    C: Send + 'static,
{
    fn async_write(&self, token: Token, bytes: Vec<u8>) -> Result<()> {
        self.sender
            .submit(move |lp: &mut EventLoop<H, C>| lp.handle_async_write(token, bytes))
    }

    fn wake(&self, token: Token) -> Result<()> {
        self.sender
            .submit_urgent(move |lp: &mut EventLoop<H, C>| lp.handle_wake(token))
    }

    fn close(&self, token: Token) -> Result<()> {
        self.sender
            .submit(move |lp: &mut EventLoop<H, C>| lp.handle_close_task(token))
    }
}

/// Operations a [`UdpHandle`] needs from its owning loop, erased over the
/// loop's handler/context types the same way [`LoopSink`] is.
trait UdpSink: Send + Sync {
    fn send_to(&self, bytes: Vec<u8>, remote: SocketAddr) -> Result<()>;
}

struct UdpSinkImpl<H, C> {
    sender: Sender<EventLoop<H, C>>,
}

impl<H, C> UdpSink for UdpSinkImpl<H, C>
where
    H: Handler<C> + 'static,
    C: Send + 'static,
{
    fn send_to(&self, bytes: Vec<u8>, remote: SocketAddr) -> Result<()> {
        self.sender
            .submit(move |lp: &mut EventLoop<H, C>| lp.handle_udp_send(bytes, remote))
    }
}

/// A cheaply cloneable, thread-safe handle for sending UDP datagrams from
/// any thread (spec §6 "Thread-safe" operation `SendTo`).
#[derive(Clone)]
pub struct UdpHandle {
    sink: Arc<dyn UdpSink>,
}

impl UdpHandle {
    /// Schedules `bytes` to be sent to `remote` on the owning loop's thread
    /// (spec §4.6 "UDP path": `SendTo` writes directly, no buffering).
    /// A no-op if the loop has no bound UDP socket.
    pub fn send_to(&self, bytes: Vec<u8>, remote: SocketAddr) -> Result<()> {
        self.sink.send_to(bytes, remote)
    }
}

/// One reactor thread's worth of state: a poller, a task channel, a
/// connection registry, a handler, and an optional listener/UDP socket.
///
/// `H` is the user's [`Handler`] implementation; `C` is the opaque
/// per-connection context type (spec §9).
pub struct EventLoop<H, C> {
    poller: Arc<Poller>,
    events: Events,
    channel: TaskChannel<EventLoop<H, C>>,
    sink: Arc<dyn LoopSink<C>>,
    udp_sink: Arc<dyn UdpSink>,
    connections: Slab<Connection<C>>,
    listener: Option<TcpListener>,
    udp: Option<UdpSocket>,
    handler: H,
    codec: Box<dyn Codec<C> + Send>,
    config: LoopConfig,
    next_tick: Option<Instant>,
    running: bool,
    loop_index: usize,
}

impl<H, C> EventLoop<H, C>
where
    H: Handler<C> + 'static,
    C: Default + Send + 'static,
{
    pub fn new(handler: H, config: LoopConfig) -> Result<EventLoop<H, C>> {
        let poller = Arc::new(Poller::new()?);
        let channel = TaskChannel::new(config.task_channel_capacity, poller.clone());
        let sink: Arc<dyn LoopSink<C>> = Arc::new(LoopSinkImpl {
            sender: channel.sender(),
        });
        let udp_sink: Arc<dyn UdpSink> = Arc::new(UdpSinkImpl {
            sender: channel.sender(),
        });
        let next_tick = config.tick_interval.map(|d| Instant::now() + d);

        Ok(EventLoop {
            poller,
            events: Events::with_capacity(1024),
            channel,
            sink,
            udp_sink,
            connections: Slab::new(),
            listener: None,
            udp: None,
            handler,
            codec: Box::new(IdentityCodec),
            config,
            next_tick,
            running: true,
            loop_index: 0,
        })
    }

    /// Overrides the default identity codec; must be called before `run`.
    pub fn set_codec(&mut self, codec: Box<dyn Codec<C> + Send>) {
        self.codec = codec;
    }

    /// A cloneable sender any thread can use to schedule work onto this
    /// loop directly (lower-level than [`crate::connection::ConnHandle`];
    /// used by the listener/orchestrator layer, not typically by user
    /// code).
    pub fn sender(&self) -> Sender<EventLoop<H, C>> {
        self.channel.sender()
    }

    /// Binds and listens on `addr`, accepting connections directly on this
    /// loop (spec §1 "minimal single-loop listener", §4.6).
    pub fn listen_tcp(&mut self, addr: SocketAddr) -> Result<()> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(Error::Io)?;
        socket.set_nonblocking(true).map_err(Error::Io)?;
        socket.set_reuse_address(true).map_err(Error::Io)?;
        socket.bind(&addr.into()).map_err(Error::Io)?;
        socket.listen(1024).map_err(Error::Io)?;
        let listener: TcpListener = socket.into();

        self.poller
            .register(iovec::raw_fd_of(&listener), LISTENER_TOKEN, Interest::READABLE)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// The bound listener's local address, if `listen_tcp` has been called.
    /// Mainly useful for tests that bind to an ephemeral port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Binds a UDP socket on this loop (spec §4.6 "UDP path": no
    /// per-datagram connection registry, no buffering).
    pub fn bind_udp(&mut self, addr: SocketAddr) -> Result<()> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::Io)?;
        socket.set_nonblocking(true).map_err(Error::Io)?;
        socket.bind(&addr.into()).map_err(Error::Io)?;
        let udp: UdpSocket = socket.into();

        self.poller
            .register(iovec::raw_fd_of(&udp), UDP_TOKEN, Interest::READABLE)?;
        self.udp = Some(udp);
        Ok(())
    }

    /// The bound UDP socket's local address, if `bind_udp` has been called.
    /// Mainly useful for tests that bind to an ephemeral port.
    pub fn local_addr_udp(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|u| u.local_addr().ok())
    }

    /// A cloneable, thread-safe handle for `SendTo` (spec §6). Usable once
    /// [`EventLoop::bind_udp`] has been called; sends scheduled before that
    /// are silently dropped since there is no socket to send from.
    pub fn udp_handle(&self) -> UdpHandle {
        UdpHandle {
            sink: self.udp_sink.clone(),
        }
    }

    /// Runs the main cycle until a handler callback returns
    /// `Action::Shutdown` (spec §4.6 "Main cycle").
    pub fn run(&mut self) -> Result<()> {
        self.handler.on_init_complete(ServerInfo {
            loop_index: self.loop_index,
        });
        while self.running {
            self.run_once()?;
        }
        self.channel.close();
        for mut conn in self.connections.drain() {
            conn.release_buffers();
        }
        self.handler.on_shutdown(ServerInfo {
            loop_index: self.loop_index,
        });
        Ok(())
    }

    fn run_once(&mut self) -> Result<()> {
        let timeout = self.next_poll_timeout();
        self.poller.poll(&mut self.events, timeout)?;

        let batch: Vec<_> = self.events.iter().collect();
        for (token, readiness) in batch {
            if token == WAKE_TOKEN {
                self.poller.drain_wake();
                self.drain_tasks();
            } else if token == LISTENER_TOKEN {
                self.accept_loop();
            } else if token == UDP_TOKEN {
                self.handle_udp_readable();
            } else if readiness.is_hup() {
                self.close_connection(token, None);
            } else {
                if readiness.readable {
                    self.handle_read(token);
                }
                if readiness.writable && self.connections.contains(token.0) {
                    self.handle_write(token);
                }
            }
        }

        self.maybe_tick();
        Ok(())
    }

    fn next_poll_timeout(&self) -> Option<Duration> {
        match self.next_tick {
            Some(deadline) => Some(deadline.saturating_duration_since(Instant::now())),
            None => Some(self.config.poll_timeout),
        }
    }

    fn maybe_tick(&mut self) {
        let Some(deadline) = self.next_tick else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }
        let (delay, action) = self.handler.tick();
        self.next_tick = delay.map(|d| Instant::now() + d);
        if action == Action::Shutdown {
            self.running = false;
        }
    }

    fn drain_tasks(&mut self) {
        let budget = self.config.tasks_per_tick * 2;
        for _ in 0..budget {
            match self.channel.pop() {
                Some(task) => task.invoke(self),
                None => break,
            }
        }
    }

    fn handle_async_write(&mut self, token: Token, bytes: Vec<u8>) {
        self.write_now(token, &bytes);
    }

    fn handle_wake(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(token.0) else {
            return;
        };
        let (out, action) = self.handler.react(&[], conn);
        self.apply_react_result(token, out, action);
    }

    fn handle_close_task(&mut self, token: Token) {
        self.close_connection(token, None);
    }

    fn accept_loop(&mut self) {
        loop {
            let Some(listener) = &self.listener else {
                return;
            };
            match listener.accept() {
                Ok((stream, remote_addr)) => {
                    if let Err(e) = self.spawn_connection(stream, remote_addr) {
                        crate::warn!("failed to register accepted connection: {}", e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    crate::warn!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    fn spawn_connection(&mut self, stream: TcpStream, remote_addr: SocketAddr) -> Result<()> {
        stream.set_nonblocking(true).map_err(Error::Io)?;
        let local_addr = stream.local_addr().map_err(Error::Io)?;
        let fd = iovec::raw_fd_of(&stream);

        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());
        let handle = ConnHandle::new(token, self.sink.clone());
        let mut conn = Connection::new(
            stream,
            local_addr,
            remote_addr,
            &self.config,
            C::default(),
            handle,
        );
        conn.set_state(ConnState::Opening);
        entry.insert(conn);

        self.poller.register(fd, token, Interest::READABLE)?;

        let conn = self
            .connections
            .get_mut(token.0)
            .expect("just inserted above");
        conn.set_state(ConnState::Open);
        let (out, action) = self.handler.on_opened(conn);
        crate::trace!("connection opened: {:?} -> {}", token, remote_addr);
        self.apply_react_result(token, out, action);
        Ok(())
    }

    fn handle_read(&mut self, token: Token) {
        let overflow = self.config.read_overflow_capacity;
        let outcome = match self.connections.get_mut(token.0) {
            Some(conn) => conn.fill_from_socket(overflow),
            None => return,
        };

        match outcome {
            Ok(FillOutcome::WouldBlock) => return,
            Ok(FillOutcome::PeerClosed) => {
                self.close_connection(token, None);
                return;
            }
            Ok(FillOutcome::Filled) => {}
            Err(e) => {
                self.close_connection(token, Some(e));
                return;
            }
        }

        self.decode_loop(token);
    }

    fn decode_loop(&mut self, token: Token) {
        loop {
            let decoded = match self.connections.get_mut(token.0) {
                Some(conn) => self.codec.decode(conn),
                None => return,
            };

            match decoded {
                Ok(Decoded::NeedMoreData) => return,
                Ok(Decoded::Frame(frame)) => {
                    let Some(conn) = self.connections.get_mut(token.0) else {
                        return;
                    };
                    let (out, action) = self.handler.react(&frame, conn);
                    self.apply_react_result(token, out, action);
                    if !self.connections.contains(token.0) {
                        return;
                    }
                }
                Err(e) => {
                    crate::debug!("decode error on {:?}: {}", token, e);
                    self.close_connection(token, Some(e));
                    return;
                }
            }
        }
    }

    fn handle_write(&mut self, token: Token) {
        let outcome = match self.connections.get_mut(token.0) {
            Some(conn) => conn.flush_outbound(),
            None => return,
        };

        match outcome {
            Ok(FlushOutcome::Drained) => {
                let wants_close = self
                    .connections
                    .get(token.0)
                    .map(|conn| conn.pending_close())
                    .unwrap_or(false);
                if wants_close {
                    self.close_connection(token, None);
                } else {
                    self.reconcile_interest(token);
                }
            }
            Ok(FlushOutcome::Partial) | Ok(FlushOutcome::WouldBlock) => {}
            Err(e) => self.close_connection(token, Some(e)),
        }
    }

    /// Encodes and enqueues `bytes` for `token`, then reconciles poller
    /// interest (spec §4.6 "Synchronous write path").
    fn write_now(&mut self, token: Token, bytes: &[u8]) {
        let encoded = match self.connections.get_mut(token.0) {
            Some(conn) => {
                self.handler.pre_write(conn);
                match self.codec.encode(conn, bytes) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        crate::debug!("encode error on {:?}: {}", token, e);
                        return;
                    }
                }
            }
            None => return,
        };

        let Some(conn) = self.connections.get_mut(token.0) else {
            return;
        };
        if let Err(e) = conn.enqueue_write(&encoded) {
            match e {
                // Out-of-resource on write buffering is returned to the
                // caller, not fatal to the connection (spec §7).
                Error::ResourceExhausted { max } => {
                    crate::debug!(
                        "outbound buffer on {:?} would exceed {} bytes; write dropped",
                        token,
                        max
                    );
                    return;
                }
                other => {
                    self.close_connection(token, Some(other));
                    return;
                }
            }
        }
        self.handler.after_write(conn, &encoded);
        self.reconcile_interest(token);
    }

    fn apply_react_result(&mut self, token: Token, out: Option<Vec<u8>>, action: Action) {
        if let Some(bytes) = out {
            self.write_now(token, &bytes);
            if !self.connections.contains(token.0) {
                return;
            }
        }
        match action {
            Action::None => {}
            Action::Close => {
                // Defer the actual close until any just-enqueued bytes have
                // reached the peer (spec §8 "close during write").
                let drained = self
                    .connections
                    .get(token.0)
                    .map(|conn| conn.outbound_is_empty())
                    .unwrap_or(true);
                if drained {
                    self.close_connection(token, None);
                } else if let Some(conn) = self.connections.get_mut(token.0) {
                    conn.set_pending_close(true);
                }
            }
            Action::Shutdown => self.running = false,
        }
    }

    /// Keeps the poller's registered interest in sync with whether the
    /// outbound buffer is non-empty (spec §8 invariant).
    fn reconcile_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };
        let desired = conn.desired_interest();
        if desired == conn.armed_interest() {
            return;
        }
        let fd = conn.raw_fd();
        if self.poller.modify(fd, token, desired).is_ok() {
            if let Some(conn) = self.connections.get_mut(token.0) {
                conn.set_armed_interest(desired);
            }
        }
    }

    fn close_connection(&mut self, token: Token, err: Option<Error>) {
        if !self.connections.contains(token.0) {
            return;
        }
        let mut conn = self.connections.remove(token.0);
        conn.set_state(ConnState::Closing);
        let _ = self.poller.deregister(conn.raw_fd());
        if let Some(ref e) = err {
            crate::debug!("connection {:?} closed: {}", token, e);
        } else {
            crate::trace!("connection {:?} closed", token);
        }
        let action = self.handler.on_closed(&mut conn, err.as_ref());
        conn.release_buffers();
        conn.set_state(ConnState::Closed);
        if action == Action::Shutdown {
            self.running = false;
        }
    }

    fn handle_udp_readable(&mut self) {
        let Some(udp) = &self.udp else { return };
        let mut scratch = vec![0u8; self.config.read_overflow_capacity];
        loop {
            match udp.recv_from(&mut scratch) {
                Ok((n, remote)) => {
                    let (out, action) = self.handler.react_datagram(&scratch[..n], remote);
                    if let Some(bytes) = out {
                        self.handle_udp_send(bytes, remote);
                    }
                    if action == Action::Shutdown {
                        self.running = false;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    crate::warn!("udp recv failed: {}", e);
                    return;
                }
            }
        }
    }

    /// Sends `bytes` to `remote` on the bound UDP socket (spec §4.6 "UDP
    /// path": `SendTo` writes directly, no buffering). A no-op if no UDP
    /// socket is bound.
    fn handle_udp_send(&mut self, bytes: Vec<u8>, remote: SocketAddr) {
        let Some(udp) = &self.udp else { return };
        if let Err(e) = udp.send_to(&bytes, remote) {
            crate::warn!("udp send failed: {}", e);
        }
    }
}
