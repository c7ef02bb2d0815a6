// Process-local read cursor over a broadcast queue.

use std::sync::atomic::{fence, Ordering::Acquire};
use std::time::{Duration, Instant};

use super::Bcast::{BroadcastQueue, BufferView};
use crate::Core::futex;

/// An independent position in a [`BroadcastQueue`].
///
/// Cursors share nothing with each other and need no synchronization; make
/// as many as you like. Each one sees published entries in publish order and
/// counts every entry it skipped because it was evicted first.
///
/// Reading is split in two because a lock-free ring cannot pin a slot:
/// [`consume_begin`](Subscriber::consume_begin) hands out a view,
/// [`consume_end`](Subscriber::consume_end) says whether the view stayed
/// valid for the whole read.
pub struct Subscriber<'q> {
    queue: &'q BroadcastQueue<'q>,
    next_idx: u64,
    drops: u64,
    active: bool,
}

impl<'q> Subscriber<'q> {
    /// Start at the current tail: nothing published before this call is
    /// seen, nothing published after it is missed (modulo eviction).
    pub fn new(queue: &'q BroadcastQueue<'q>) -> Self {
        Self {
            queue,
            next_idx: queue.tail_index(),
            drops: 0,
            active: false,
        }
    }

    /// Start at the oldest entry the ring still holds.
    pub fn from_oldest(queue: &'q BroadcastQueue<'q>) -> Self {
        Self {
            queue,
            next_idx: queue.head_index(),
            drops: 0,
            active: false,
        }
    }

    /// Re-attach this cursor to the current tail, keeping its drop count.
    pub fn begin(&mut self) {
        self.next_idx = self.queue.tail_index();
        self.active = false;
    }

    /// Wait for the next entry and return a view of it.
    ///
    /// `timeout`: `Some(Duration::ZERO)` polls, `Some(d)` waits up to `d`,
    /// `None` waits indefinitely. Returns `None` if nothing arrived in time.
    ///
    /// Every `Some` must be followed by [`consume_end`](Self::consume_end)
    /// before the next `consume_begin`.
    pub fn consume_begin(&mut self, timeout: Option<Duration>) -> Option<BufferView<'q>> {
        debug_assert!(!self.active, "consume_begin without consume_end");
        let queue = self.queue;
        let h = queue.header();
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            let tail = h.tail_idx.load(Acquire);
            if self.next_idx >= tail {
                let wait = match (timeout, deadline) {
                    (Some(t), _) if t.is_zero() => return None,
                    (_, Some(deadline)) => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            return None;
                        }
                        Some(left)
                    }
                    _ => None,
                };
                futex::futex_wait(queue.tail_word(), tail as u32, wait);
                continue;
            }

            let r = queue.slot(self.next_idx).load(Acquire);
            if r.tag != self.next_idx || self.next_idx < h.head_idx.load(Acquire) {
                // Evicted before we got here.
                self.next_idx += 1;
                self.drops += 1;
                std::hint::spin_loop();
                continue;
            }

            self.active = true;
            return Some(queue.view(r.value));
        }
    }

    /// Finish the read started by `consume_begin`.
    ///
    /// Returns `false` if the entry was evicted while it was being read; the
    /// caller must then discard whatever it derived from the view, and the
    /// entry counts as a drop.
    pub fn consume_end(&mut self) -> bool {
        debug_assert!(self.active, "consume_end without consume_begin");
        // Order the caller's reads of the buffer before the head check.
        fence(Acquire);
        let valid = self.next_idx >= self.queue.header().head_idx.load(Acquire);
        if !valid {
            self.drops += 1;
        }
        self.next_idx += 1;
        self.active = false;
        valid
    }

    /// Entries this cursor never saw (or saw torn), cumulative.
    pub fn drops(&self) -> u64 {
        self.drops
    }

    /// Logical index of the next entry this cursor will look at.
    pub fn next_index(&self) -> u64 {
        self.next_idx
    }

    /// Whether a `consume_begin` is awaiting its `consume_end`.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn queue(&self) -> &'q BroadcastQueue<'q> {
        self.queue
    }
}
