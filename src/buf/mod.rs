//! Buffering primitives: the inbound ring buffer and the mixed outbound
//! buffer (spec §2 components 2 and 3).

pub mod outbound;
pub mod ring;

pub use outbound::OutboundBuffer;
pub use ring::RingBuffer;
