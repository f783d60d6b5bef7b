//! Scatter/gather I/O adapter (spec §4.4).
//!
//! Wraps `writev`/`readv` via `std::io::{IoSlice, IoSliceMut}` so a
//! multi-segment buffer flushes or fills in a single syscall, truthfully
//! reporting partial transfers rather than looping to completion (looping
//! is the event loop's job, not this adapter's).

use std::io::{self, IoSlice, Write};
use std::os::unix::io::AsRawFd;

/// Writes as many of `iovecs` as the kernel accepts in one call, returning
/// the number of bytes written. A `WouldBlock` maps to `Ok(0)` so callers
/// can treat it uniformly with a zero-length partial write; a genuine
/// short/partial write and a `WouldBlock` are reported the same way the
/// spec requires (truthfully, without retrying here).
pub fn write_vectored<W: Write>(writer: &mut W, iovecs: &[IoSlice<'_>]) -> io::Result<usize> {
    match writer.write_vectored(iovecs) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

/// Zero-copy send, where supported.
///
/// **Resolved Open Question (SPEC_FULL.md §4.4):** `MSG_ZEROCOPY` requires
/// draining completion notifications from the socket's error queue
/// (`MSG_ERRQUEUE`) before the sender's buffer can be safely reused or
/// freed, and this reactor has no mechanism to wait on that queue without
/// blocking the owning loop's hot path. Rather than risk reclaiming a
/// buffer the kernel is still reading from, zero-copy is disabled: this
/// always falls back to an ordinary vectored write. The signature is kept
/// so a future completion-tracking mechanism can replace the body without
/// changing call sites.
pub fn send_zero_copy<W: Write>(writer: &mut W, iovecs: &[IoSlice<'_>]) -> io::Result<usize> {
    write_vectored(writer, iovecs)
}

/// Returns the underlying raw fd for logging/diagnostics.
pub fn raw_fd_of<T: AsRawFd>(io: &T) -> i32 {
    io.as_raw_fd()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn write_vectored_reports_total_bytes_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let a = IoSlice::new(b"hello ");
        let b = IoSlice::new(b"world");
        let n = write_vectored(&mut client, &[a, b]).unwrap();
        assert_eq!(n, 11);

        let mut got = [0u8; 11];
        server.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"hello world");
    }
}
