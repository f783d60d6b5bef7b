//! Event loop configuration.
//!
//! A plain, `Copy`, `Default`-implementing struct rather than a builder
//! with validation, since every field has an independently sensible
//! default and there are no cross-field invariants to enforce at
//! construction time.

use std::time::Duration;

/// Tunables for a single [`crate::EventLoop`].
#[derive(Copy, Clone, Debug)]
pub struct LoopConfig {
    /// Upper bound on how long a single `Poll` call may block when there is
    /// no pending tick and the task channel is empty.
    pub poll_timeout: Duration,

    /// Capacity of each of the task channel's two priority queues (spec
    /// §4.5). A submit against a full queue returns
    /// [`crate::Error::ChannelFull`].
    pub task_channel_capacity: usize,

    /// Maximum number of queued tasks drained per wake, per priority class,
    /// before control returns to I/O dispatch. Bounds tail latency for
    /// connection events under a submission burst.
    pub tasks_per_tick: usize,

    /// Interval between `Handler::tick` invocations, if the handler keeps
    /// requesting one. `None` disables ticking.
    pub tick_interval: Option<Duration>,

    /// Initial capacity of a freshly created inbound ring buffer.
    pub initial_ring_capacity: usize,

    /// Ceiling past which a ring buffer refuses to grow further (spec
    /// §4.2); exceeding it is `Error::ResourceExhausted`.
    pub max_ring_capacity: usize,

    /// Capacity of the ring half of the mixed outbound buffer (spec §4.3).
    pub outbound_ring_capacity: usize,

    /// Ceiling on the combined ring+list outbound buffer, in bytes; a
    /// write that would exceed it is rejected with
    /// `Error::ResourceExhausted` instead of buffered (spec §5, §7
    /// "out-of-resource on write buffering").
    pub max_outbound_bytes: usize,

    /// Upper bound on a single `readv`-style drain from a readable socket,
    /// beyond whatever room is already free in the inbound ring (spec
    /// §4.6 `handleRead` step 1, "one page" by default).
    pub read_overflow_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> LoopConfig {
        LoopConfig {
            poll_timeout: Duration::from_millis(1_000),
            task_channel_capacity: 4_096,
            tasks_per_tick: 256,
            tick_interval: None,
            initial_ring_capacity: 4 * 1024,
            max_ring_capacity: 16 * 1024 * 1024,
            outbound_ring_capacity: 16 * 1024,
            max_outbound_bytes: 16 * 1024 * 1024,
            read_overflow_capacity: 4 * 1024,
        }
    }
}
