//! Thread-safe wake channel (spec §4.1 `Wake()`, §4.5 "every successful
//! submit must be followed by a poller `Wake()`").
//!
//! On Linux, backed by `eventfd(2)` in non-blocking mode: a single 8-byte
//! write bumps the kernel-side counter and a readable event fires exactly
//! once per drain, regardless of how many wakes coalesced before the loop
//! got around to polling. On kqueue platforms there is no eventfd, so a
//! self-pipe stands in instead.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use crate::interest::Interest;
use crate::sys::Selector;
use crate::token::Token;

#[cfg(target_os = "linux")]
pub(crate) struct Waker {
    fd: std::fs::File,
}

#[cfg(target_os = "linux")]
impl Waker {
    pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        use std::os::fd::FromRawFd;

        let fd = crate::sys::syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
        // SAFETY: `eventfd` returned a valid, owned fd on success.
        let file = unsafe { std::fs::File::from_raw_fd(fd) };
        selector.register(file.as_raw_fd(), token, Interest::READABLE)?;
        Ok(Waker { fd: file })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        match (&self.fd).write(&1u64.to_ne_bytes()) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // The counter is about to overflow; drain it and retry once.
                self.drain();
                (&self.fd).write(&1u64.to_ne_bytes()).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 8];
        let _ = (&self.fd).read(&mut buf);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) struct Waker {
    read: std::fs::File,
    write: std::fs::File,
}

#[cfg(not(target_os = "linux"))]
impl Waker {
    pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        use std::os::fd::FromRawFd;

        let mut fds = [0 as libc::c_int; 2];
        crate::sys::syscall!(pipe(fds.as_mut_ptr()))?;
        // SAFETY: `pipe(2)` returned two valid, owned fds on success.
        let read = unsafe { std::fs::File::from_raw_fd(fds[0]) };
        let write = unsafe { std::fs::File::from_raw_fd(fds[1]) };
        set_nonblocking(read.as_raw_fd())?;
        set_nonblocking(write.as_raw_fd())?;
        selector.register(read.as_raw_fd(), token, Interest::READABLE)?;
        Ok(Waker { read, write })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        match (&self.write).write(&[1u8]) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.read).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = crate::sys::syscall!(fcntl(fd, libc::F_GETFL))?;
    crate::sys::syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    Ok(())
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        #[cfg(target_os = "linux")]
        {
            self.fd.as_raw_fd()
        }
        #[cfg(not(target_os = "linux"))]
        {
            self.read.as_raw_fd()
        }
    }
}
