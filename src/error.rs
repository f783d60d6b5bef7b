//! Error types surfaced by the reactor.
//!
//! Transient conditions (`EAGAIN`, `EINTR`) never reach this type; they are
//! absorbed where they occur. Everything here is either handed back to the
//! caller of a thread-safe entry point or delivered to a handler's
//! `on_closed`/loop-exit path, per spec §7.

use std::io;

/// Errors produced by the reactor's public API.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying OS readiness facility failed in a way that isn't
    /// recoverable; the owning loop must exit.
    #[error("poller failed fatally: {0}")]
    PollerFatal(#[source] io::Error),

    /// A codec reported malformed input. Fatal to the connection it
    /// occurred on, not to the loop.
    #[error("codec decode error: {0}")]
    Decode(String),

    /// The peer closed the connection, or reset it.
    #[error("connection closed: {0}")]
    PeerClosed(#[source] io::Error),

    /// A task-submission queue (normal or urgent) was full.
    #[error("task channel is full")]
    ChannelFull,

    /// The owning loop has already shut down; submissions are rejected.
    #[error("task channel is closed")]
    ChannelClosed,

    /// A ring buffer was asked to grow past its configured maximum.
    #[error("buffer would exceed configured maximum of {max} bytes")]
    ResourceExhausted { max: usize },

    /// Any other I/O failure (bind, socket options, accept, ...).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for conditions that close a single connection but never the
    /// owning loop.
    pub fn is_connection_local(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::PeerClosed(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
