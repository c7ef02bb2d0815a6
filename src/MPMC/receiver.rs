use std::time::{Duration, Instant};

use crate::MPMC::Bcast::{BroadcastQueue, Subscriber};
use crate::MPMC::Structs::{MessageMeta, FRAME_HEADER};

/// One message returned by [`Receiver::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Payload bytes written to the caller's buffer. Less than
    /// `meta.payload_len` if the buffer was too short.
    pub len: usize,
    /// Messages missed since the previous successful `recv`.
    pub drops: u64,
    pub meta: MessageMeta,
}

/// Copies messages sent by a [`Publisher`](super::Publisher) out of a
/// broadcast queue, retrying past entries that were evicted mid-read.
pub struct Receiver<'q> {
    sub: Subscriber<'q>,
    reported_drops: u64,
}

impl<'q> Receiver<'q> {
    /// Receive everything published from now on.
    pub fn new(queue: &'q BroadcastQueue<'q>) -> Self {
        Self::from_subscriber(Subscriber::new(queue))
    }

    /// Receive starting at the oldest message the queue still holds.
    pub fn from_oldest(queue: &'q BroadcastQueue<'q>) -> Self {
        Self::from_subscriber(Subscriber::from_oldest(queue))
    }

    pub fn from_subscriber(sub: Subscriber<'q>) -> Self {
        let reported_drops = sub.drops();
        Self {
            sub,
            reported_drops,
        }
    }

    /// Copy the next message's payload into `out`.
    ///
    /// `timeout` bounds the whole call, retries included, with the same
    /// meaning as in [`Subscriber::consume_begin`]. Returns `None` if no
    /// intact message arrived in time.
    pub fn recv(&mut self, out: &mut [u8], timeout: Option<Duration>) -> Option<Received> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut header = [0u8; FRAME_HEADER];

        loop {
            let wait = match (timeout, deadline) {
                (Some(t), _) if t.is_zero() => Some(Duration::ZERO),
                (_, Some(deadline)) => Some(deadline.saturating_duration_since(Instant::now())),
                _ => None,
            };
            let view = self.sub.consume_begin(wait)?;

            let got = view.read_into(&mut header);
            let meta = MessageMeta::from_bytes(&header);
            // A torn header can carry any length; clamp before using it.
            let max_payload = view.len().saturating_sub(FRAME_HEADER);
            let n = (meta.payload_len as usize).min(max_payload).min(out.len());
            view.read_at(FRAME_HEADER, &mut out[..n]);

            if !self.sub.consume_end() || got < FRAME_HEADER {
                continue;
            }

            let drops = self.sub.drops() - self.reported_drops;
            self.reported_drops = self.sub.drops();
            return Some(Received { len: n, drops, meta });
        }
    }

    /// Total messages this receiver missed.
    pub fn drops(&self) -> u64 {
        self.sub.drops()
    }

    pub fn subscriber(&self) -> &Subscriber<'q> {
        &self.sub
    }
}
