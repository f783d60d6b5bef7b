//! Linux backend: `epoll_create1`/`epoll_ctl`/`epoll_wait`, edge-triggered.
//!
//! Edge-triggered via `EPOLLET`, read/write-only interest set (no
//! AIO/priority bits).

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::interest::{Interest, Readiness};
use crate::sys::syscall;
use crate::token::Token;

#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let ep = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        // SAFETY: `epoll_create1` returned a valid, owned fd on success.
        Ok(Selector {
            ep: unsafe { OwnedFd::from_raw_fd(ep) },
        })
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: token.0 as u64,
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)).map(|_| ())
    }

    pub fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: token.0 as u64,
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut event)).map(|_| ())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        // `epoll_ctl` still requires a non-null event pointer pre-4.3
        // kernels; pass a throwaway one for portability.
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        match syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            &mut event
        )) {
            Ok(_) => Ok(()),
            // The fd may already be gone if the caller closed it first;
            // that's permitted by spec §4.1.
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn select(&self, events: &mut Vec<libc::epoll_event>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|to| to.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        events.clear();
        let cap = events.capacity().max(1);
        let n = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            events.as_mut_ptr(),
            cap as i32,
            timeout_ms,
        ))?;
        // SAFETY: `epoll_wait` initialized exactly `n` elements.
        unsafe { events.set_len(n as usize) };
        Ok(())
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut kind = libc::EPOLLET;
    if interest.is_readable() {
        kind |= libc::EPOLLIN | libc::EPOLLRDHUP;
    }
    if interest.is_writable() {
        kind |= libc::EPOLLOUT;
    }
    kind as u32
}

pub fn readiness_of(event: &libc::epoll_event) -> (Token, Readiness) {
    let e = event.events as libc::c_int;
    let token = Token(event.u64 as usize);
    let readiness = Readiness {
        readable: e & (libc::EPOLLIN | libc::EPOLLPRI) != 0,
        writable: e & libc::EPOLLOUT != 0,
        error: e & libc::EPOLLERR != 0,
        read_closed: e & libc::EPOLLHUP != 0 || (e & libc::EPOLLIN != 0 && e & libc::EPOLLRDHUP != 0),
    };
    (token, readiness)
}
