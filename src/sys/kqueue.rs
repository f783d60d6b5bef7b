//! BSD/macOS backend: `kqueue`/`kevent`, edge-triggered via `EV_CLEAR`.
//!
//! One `EVFILT_READ`/`EVFILT_WRITE` pair per fd, registered with
//! `EV_CLEAR | EV_ADD`, trimmed to this spec's read/write-only interest set.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

use crate::interest::{Interest, Readiness};
use crate::sys::syscall;
use crate::token::Token;

#[derive(Debug)]
pub struct Selector {
    kq: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let kq = syscall!(kqueue())?;
        syscall!(fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC))?;
        // SAFETY: `kqueue()` returned a valid, owned fd on success.
        Ok(Selector {
            kq: unsafe { OwnedFd::from_raw_fd(kq) },
        })
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        self.apply(fd, token, interest, libc::EV_ADD | libc::EV_CLEAR)
    }

    pub fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        // kqueue has no MOD verb: re-adding with the new filter set is
        // idempotent and replaces the prior registration for that filter.
        self.apply(fd, token, interest, libc::EV_ADD | libc::EV_CLEAR)?;
        if !interest.is_writable() {
            self.delete_filter(fd, libc::EVFILT_WRITE)?;
        }
        if !interest.is_readable() {
            self.delete_filter(fd, libc::EVFILT_READ)?;
        }
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let _ = self.delete_filter(fd, libc::EVFILT_READ);
        let _ = self.delete_filter(fd, libc::EVFILT_WRITE);
        Ok(())
    }

    fn apply(&self, fd: RawFd, token: Token, interest: Interest, flags: u16) -> io::Result<()> {
        let mut changes = Vec::with_capacity(2);
        if interest.is_readable() {
            changes.push(new_kevent(fd, libc::EVFILT_READ, flags, token));
        }
        if interest.is_writable() {
            changes.push(new_kevent(fd, libc::EVFILT_WRITE, flags, token));
        }
        self.kevent_apply(&mut changes)
    }

    fn delete_filter(&self, fd: RawFd, filter: i16) -> io::Result<()> {
        let mut changes = vec![new_kevent(fd, filter, libc::EV_DELETE, Token(0))];
        self.kevent_apply(&mut changes)
    }

    fn kevent_apply(&self, changes: &mut [libc::kevent]) -> io::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        syscall!(kevent(
            self.kq.as_raw_fd(),
            changes.as_ptr(),
            changes.len() as libc::c_int,
            ptr::null_mut(),
            0,
            ptr::null(),
        ))
        .map(|_| ())
    }

    pub fn select(&self, events: &mut Vec<libc::kevent>, timeout: Option<Duration>) -> io::Result<()> {
        let ts = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: to.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts
            .as_ref()
            .map(|t| t as *const libc::timespec)
            .unwrap_or(ptr::null());

        events.clear();
        let cap = events.capacity().max(1);
        let mut buf: Vec<MaybeUninit<libc::kevent>> = Vec::with_capacity(cap);
        // SAFETY: `kevent` only ever initializes the first `n` elements,
        // which we then copy out before anything reads the rest.
        unsafe { buf.set_len(cap) };

        let n = syscall!(kevent(
            self.kq.as_raw_fd(),
            ptr::null(),
            0,
            buf.as_mut_ptr() as *mut libc::kevent,
            cap as libc::c_int,
            ts_ptr,
        ))?;

        for slot in &buf[..n as usize] {
            // SAFETY: the kernel initialized these first `n` slots.
            events.push(unsafe { slot.assume_init() });
        }
        Ok(())
    }
}

fn new_kevent(fd: RawFd, filter: i16, flags: u16, token: Token) -> libc::kevent {
    libc::kevent {
        ident: fd as libc::uintptr_t,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: token.0 as *mut libc::c_void,
    }
}

pub fn readiness_of(event: &libc::kevent) -> (Token, Readiness) {
    let token = Token(event.udata as usize);
    let is_write = event.filter == libc::EVFILT_WRITE;
    let readiness = Readiness {
        readable: !is_write,
        writable: is_write,
        error: event.flags & libc::EV_ERROR != 0,
        read_closed: event.flags & libc::EV_EOF != 0,
    };
    (token, readiness)
}
