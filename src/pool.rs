//! Process-wide buffer pools (spec §5 "Resource policy").
//!
//! Connection teardown is the hot path this exists for: rather than let
//! every closed connection's ring storage and outbound segments go back
//! to the global allocator only to be reallocated for the next accepted
//! connection, a process-wide free list is kept and drawn from on
//! connection creation. A pool that can't satisfy a request (empty, or
//! nothing large enough) falls back to direct allocation rather than
//! blocking or erroring. A plain `Vec<Vec<u8>>` free list behind a
//! `Mutex`, since pools here are shared across every loop thread in the
//! process rather than owned by a single IOCP handle.

use std::sync::{Mutex, OnceLock};

/// A bounded free list of reusable byte buffers.
pub struct BufferPool {
    slots: Mutex<Vec<Vec<u8>>>,
    max_slots: usize,
}

impl BufferPool {
    fn new(max_slots: usize) -> BufferPool {
        BufferPool {
            slots: Mutex::new(Vec::new()),
            max_slots,
        }
    }

    /// Removes and returns a pooled buffer with at least `min_capacity`
    /// spare room. Falls back to a fresh allocation if the pool is empty
    /// or holds nothing large enough (spec §5 "falls back to direct
    /// allocation").
    pub fn acquire(&self, min_capacity: usize) -> Vec<u8> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(pos) = slots.iter().position(|b| b.capacity() >= min_capacity) {
            let mut buf = slots.swap_remove(pos);
            buf.clear();
            return buf;
        }
        Vec::with_capacity(min_capacity)
    }

    /// Returns `buf` to the pool for reuse, unless it is already full.
    pub fn release(&self, mut buf: Vec<u8>) {
        let mut slots = self.slots.lock().unwrap();
        if slots.len() < self.max_slots {
            buf.clear();
            slots.push(buf);
        }
    }
}

const MAX_POOLED_BUFFERS: usize = 4096;

static INBOUND_RING_POOL: OnceLock<BufferPool> = OnceLock::new();
static OUTBOUND_SEGMENT_POOL: OnceLock<BufferPool> = OnceLock::new();

/// The process-wide pool inbound ring buffers are acquired from on
/// connection creation and returned to on close (spec §5).
pub(crate) fn inbound_ring_pool() -> &'static BufferPool {
    INBOUND_RING_POOL.get_or_init(|| BufferPool::new(MAX_POOLED_BUFFERS))
}

/// The process-wide pool the outbound buffer's list segments are
/// individually drawn from and returned to (spec §5).
pub(crate) fn outbound_segment_pool() -> &'static BufferPool {
    OUTBOUND_SEGMENT_POOL.get_or_init(|| BufferPool::new(MAX_POOLED_BUFFERS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_empty_pool_falls_back_to_direct_allocation() {
        let pool = BufferPool::new(4);
        let buf = pool.acquire(128);
        assert!(buf.capacity() >= 128);
        assert!(buf.is_empty());
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new(4);
        let mut buf = pool.acquire(64);
        buf.extend_from_slice(b"stale");
        pool.release(buf);

        let reused = pool.acquire(32);
        assert!(reused.is_empty(), "released buffer must come back cleared");
        assert!(reused.capacity() >= 64);
    }

    #[test]
    fn release_beyond_max_slots_is_dropped_not_retained() {
        let pool = BufferPool::new(1);
        pool.release(vec![0u8; 16]);
        pool.release(vec![0u8; 16]);
        assert_eq!(pool.slots.lock().unwrap().len(), 1);
    }

    #[test]
    fn acquire_skips_buffers_that_are_too_small() {
        let pool = BufferPool::new(4);
        pool.release(Vec::with_capacity(8));
        let buf = pool.acquire(256);
        assert!(buf.capacity() >= 256);
    }
}
