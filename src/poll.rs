//! Platform-agnostic readiness poller (spec §4.1 "Readiness Poller").
//!
//! `Poller` is a thin, backend-selecting wrapper: the actual `epoll`/
//! `kqueue` syscalls live in `crate::sys`; this module owns the public
//! `Register`/`Modify`/`Deregister`/`Poll`/`Wake` surface plus the wake fd
//! that the task channel relies on, keeping the split between this module
//! and `sys::{epoll,kqueue}`.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::interest::{Interest, Readiness};
use crate::sys::{Selector, Waker};
use crate::token::{Token, WAKE_TOKEN};

#[cfg(target_os = "linux")]
type RawEvent = libc::epoll_event;
#[cfg(not(target_os = "linux"))]
type RawEvent = libc::kevent;

/// A batch of readiness events returned by one `Poller::poll` call.
pub struct Events {
    raw: Vec<RawEvent>,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Events {
        Events {
            raw: Vec::with_capacity(capacity),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Token, Readiness)> + '_ {
        self.raw.iter().map(|e| readiness_of(e))
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[cfg(target_os = "linux")]
fn readiness_of(e: &RawEvent) -> (Token, Readiness) {
    crate::sys::epoll::readiness_of(e)
}

#[cfg(not(target_os = "linux"))]
fn readiness_of(e: &RawEvent) -> (Token, Readiness) {
    crate::sys::kqueue::readiness_of(e)
}

/// Owns the OS readiness facility for one [`crate::EventLoop`], plus the
/// wake fd foreign threads use to unblock a blocking `poll`.
pub struct Poller {
    selector: Selector,
    waker: Waker,
}

impl Poller {
    pub fn new() -> Result<Poller> {
        let selector = Selector::new().map_err(Error::PollerFatal)?;
        let waker = Waker::new(&selector, WAKE_TOKEN).map_err(Error::PollerFatal)?;
        Ok(Poller { selector, waker })
    }

    /// Registers `fd` for edge-triggered notification of `interest`.
    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.selector
            .register(fd, token, interest)
            .map_err(Error::Io)
    }

    /// Changes a registration's interest mask (spec §4.1, e.g. `Read` <->
    /// `Read+Write` as the outbound buffer fills and drains).
    pub fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.selector
            .modify(fd, token, interest)
            .map_err(Error::Io)
    }

    /// Removes `fd`. Safe to call after the fd has already been closed.
    pub fn deregister(&self, fd: RawFd) -> Result<()> {
        self.selector.deregister(fd).map_err(Error::Io)
    }

    /// Blocks until at least one event is ready, the timeout elapses, or a
    /// concurrent `wake()` fires; `EINTR` is retried transparently by the
    /// `syscall!` machinery underneath (spec §4.1 failure semantics).
    pub fn poll(&self, events: &mut Events, timeout: Option<Duration>) -> Result<()> {
        match self.selector.select(&mut events.raw, timeout) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::PollerFatal(e)),
        }
    }

    pub(crate) fn wake_now(&self) -> Result<()> {
        self.waker.wake().map_err(Error::Io)
    }

    pub(crate) fn drain_wake(&self) {
        self.waker.drain();
    }
}
