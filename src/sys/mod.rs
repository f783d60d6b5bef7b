//! Platform readiness-facility backends (spec §4.1, §6 "Poller syscalls
//! assumed").
//!
//! One `Selector` implementation per backend, chosen at compile time; the
//! public [`crate::poll::Poller`] type is backend-agnostic and simply
//! re-exports whichever `Selector` matches the target OS.

#[cfg(target_os = "linux")]
pub(crate) mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::Selector;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub(crate) mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub use kqueue::Selector;

mod waker;
pub(crate) use waker::Waker;

/// Retries a libc call on `EINTR`, converting `-1` returns into
/// `io::Error::last_os_error()` (spec §4.1 "transient interruption (signal)
/// is retried internally").
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        loop {
            let res = unsafe { libc::$fn($($arg, )*) };
            if res == -1 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                break Err(err);
            }
            break Ok(res);
        }
    }};
}

pub(crate) use syscall;
