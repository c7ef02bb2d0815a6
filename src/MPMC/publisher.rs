use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::MPMC::Bcast::BroadcastQueue;
use crate::MPMC::Structs::{MessageMeta, FRAME_HEADER};

/// Copies byte messages into a broadcast queue.
///
/// Each message is framed with a [`MessageMeta`] header so receivers get the
/// payload length back along with the sender's pid and sequence number.
/// A `Publisher` can be shared between threads; sequence numbers stay unique.
pub struct Publisher<'q> {
    queue: &'q BroadcastQueue<'q>,
    pid: u32,
    sequence: AtomicU64,
}

impl<'q> Publisher<'q> {
    pub fn new(queue: &'q BroadcastQueue<'q>) -> Self {
        Self {
            queue,
            pid: std::process::id(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Sends a message through the queue.
    ///
    /// # Returns
    /// * `Ok(())` once the message is published
    /// * `Err(Error::MessageTooLarge)` if header plus payload exceed the element size
    /// * `Err(Error::Exhausted)` if every buffer is currently held by someone
    pub fn send<T: AsRef<[u8]>>(&self, message: T) -> Result<()> {
        let message = message.as_ref();

        let max = self.max_message_size();
        if FRAME_HEADER + message.len() > self.queue.element_size() {
            return Err(Error::MessageTooLarge {
                len: message.len(),
                max,
            });
        }

        let mut buf = self.queue.buffer_acquire().ok_or(Error::Exhausted)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        let meta = MessageMeta {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: now,
            sender_pid: self.pid,
            payload_len: message.len() as u32,
        };

        let out = buf.as_mut_slice();
        out[..FRAME_HEADER].copy_from_slice(&meta.to_bytes());
        out[FRAME_HEADER..FRAME_HEADER + message.len()].copy_from_slice(message);

        self.queue.publish(buf);
        Ok(())
    }

    /// Largest payload `send` accepts.
    pub fn max_message_size(&self) -> usize {
        self.queue.element_size().saturating_sub(FRAME_HEADER)
    }

    /// Messages sent so far.
    pub fn sent(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn queue(&self) -> &'q BroadcastQueue<'q> {
        self.queue
    }
}
