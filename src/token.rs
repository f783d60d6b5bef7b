//! Opaque identifiers handed out by [`crate::poll::Poller`] and used as the
//! stable key into an [`crate::EventLoop`]'s connection registry.

use std::fmt;

/// Associates an I/O source with readiness events.
///
/// A `Token` is an index into the loop's `slab`-backed connection registry
/// (see `SPEC_FULL.md` §3, §9 "Back-reference connection ↔ loop"); it is
/// never a raw pointer, so the registry can grow and shrink without
/// invalidating tokens held elsewhere.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Token(pub usize);

impl From<usize> for Token {
    fn from(val: usize) -> Token {
        Token(val)
    }
}

impl From<Token> for usize {
    fn from(val: Token) -> usize {
        val.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Token({})", self.0)
    }
}

/// Reserved token for the loop's own wake fd; never handed out by the
/// connection registry.
pub const WAKE_TOKEN: Token = Token(usize::MAX);
