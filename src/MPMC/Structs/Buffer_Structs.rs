// Frame header written at the start of every buffer sent through a Publisher.

// no atomics in MessageMeta; plain integers so any process can decode it

use std::mem::size_of;

/// Metadata that precedes each payload in a buffer.
/// Native byte order: every process sharing a region runs on the same host.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMeta {
    /// Per-publisher sequence number, starting at 0.
    pub sequence: u64,
    /// Wall clock at send time, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    pub sender_pid: u32,
    pub payload_len: u32,
}

/// Bytes the frame header occupies in front of the payload.
pub const FRAME_HEADER: usize = size_of::<MessageMeta>();

impl MessageMeta {
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER] {
        let mut out = [0u8; FRAME_HEADER];
        out[0..8].copy_from_slice(&self.sequence.to_ne_bytes());
        out[8..16].copy_from_slice(&self.timestamp_ns.to_ne_bytes());
        out[16..20].copy_from_slice(&self.sender_pid.to_ne_bytes());
        out[20..24].copy_from_slice(&self.payload_len.to_ne_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; FRAME_HEADER]) -> Self {
        let u64_at = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&b[i..i + 8]);
            u64::from_ne_bytes(w)
        };
        let u32_at = |i: usize| {
            let mut w = [0u8; 4];
            w.copy_from_slice(&b[i..i + 4]);
            u32::from_ne_bytes(w)
        };
        Self {
            sequence: u64_at(0),
            timestamp_ns: u64_at(8),
            sender_pid: u32_at(16),
            payload_len: u32_at(20),
        }
    }
}
