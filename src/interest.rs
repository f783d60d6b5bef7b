//! Readiness interest a file descriptor is registered for.

use std::fmt;
use std::ops;

/// The set of readiness events a registration cares about.
///
/// Mirrors the two interest classes spec §4.1 requires: read-only, and
/// read+write. Modeled as a small bitset rather than an enum, so `Modify`
/// can be expressed as a plain assignment instead of a match.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Interest(u8);

const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

impl Interest {
    pub const READABLE: Interest = Interest(READABLE);
    pub const WRITABLE: Interest = Interest(WRITABLE);
    pub const READABLE_WRITABLE: Interest = Interest(READABLE | WRITABLE);

    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub fn add(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    pub fn remove(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, other: Interest) -> Interest {
        self.add(other)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one = false;
        if self.is_readable() {
            one = true;
            write!(f, "READABLE")?;
        }
        if self.is_writable() {
            if one {
                write!(f, " | ")?;
            }
            write!(f, "WRITABLE")?;
        }
        Ok(())
    }
}

/// A batch readiness result for a single registered fd, as returned by
/// [`crate::poll::Poller::poll`] (spec §4.1 `Poll(timeout) -> events`).
#[derive(Copy, Clone, Debug)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub read_closed: bool,
}

impl Readiness {
    pub fn is_hup(self) -> bool {
        self.error || self.read_closed
    }
}
