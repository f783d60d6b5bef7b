//! Per-connection framing contract (spec §6 "Codec interface").
//!
//! A codec never touches outbound state and never sees more of the
//! connection than `Read`/`ReadN`/`ShiftN`/`BufferLength` expose; this
//! keeps `Decode` safely callable from `handleRead` in a loop without the
//! codec needing to know about registration or write buffering at all.

use crate::connection::Connection;
use crate::error::Result;

/// Outcome of one `Codec::decode` call.
pub enum Decoded {
    /// A complete frame was consumed from the inbound buffer.
    Frame(Vec<u8>),
    /// Not enough bytes are buffered yet; try again after the next read.
    NeedMoreData,
}

/// Consumes bytes from a connection's inbound buffer and emits frames, or
/// encodes outgoing frames just before they are enqueued for write.
///
/// `C` is the connection's opaque user-context type (spec §9 "Opaque user
/// context"), threaded through so a codec can be generic over it without
/// resorting to `Any`.
pub trait Codec<C> {
    /// Called on the loop thread, immediately before bytes are handed to
    /// the outbound buffer.
    fn encode(&mut self, conn: &mut Connection<C>, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Called from `handleRead`; must consume exactly one frame's worth of
    /// bytes via `conn.shift_n` per returned `Decoded::Frame`, or leave the
    /// buffer untouched and return `NeedMoreData`.
    fn decode(&mut self, conn: &mut Connection<C>) -> Result<Decoded>;
}

/// The identity codec: every buffered byte is one "frame" boundary-free
/// blob, handed to the handler as soon as it arrives. Used by the end-to-
/// end tests (spec §8 echo scenario) and as the crate's default codec when
/// a caller doesn't need framing.
#[derive(Default)]
pub struct IdentityCodec;

impl<C> Codec<C> for IdentityCodec {
    fn encode(&mut self, _conn: &mut Connection<C>, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decode(&mut self, conn: &mut Connection<C>) -> Result<Decoded> {
        let len = conn.buffer_length();
        if len == 0 {
            return Ok(Decoded::NeedMoreData);
        }
        let (_, bytes) = conn.read_n(len);
        conn.shift_n(bytes.len());
        Ok(Decoded::Frame(bytes))
    }
}

/// A length-prefixed (u32 big-endian) codec, grounded in the fragmented-
/// decode scenario (spec §8 #4): exercises a codec that must return
/// `NeedMoreData` more than once before a frame completes.
#[derive(Default)]
pub struct LengthPrefixedCodec;

const HEADER_LEN: usize = 4;

impl<C> Codec<C> for LengthPrefixedCodec {
    fn encode(&mut self, _conn: &mut Connection<C>, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_LEN + bytes.len());
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
        Ok(out)
    }

    fn decode(&mut self, conn: &mut Connection<C>) -> Result<Decoded> {
        if conn.buffer_length() < HEADER_LEN {
            return Ok(Decoded::NeedMoreData);
        }
        let (_, header) = conn.read_n(HEADER_LEN);
        let payload_len =
            u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if conn.buffer_length() < HEADER_LEN + payload_len {
            return Ok(Decoded::NeedMoreData);
        }

        conn.shift_n(HEADER_LEN);
        let (_, payload) = conn.read_n(payload_len);
        conn.shift_n(payload.len());
        Ok(Decoded::Frame(payload))
    }
}
