// Handles over a broadcast region. None of these structs live in shared
// memory; they are process-local views holding base pointers.

use super::layout::QueueHeader;
use crate::Core::pool::Pool;
use crate::Core::SharedMemory::HeapRegion;

use std::marker::PhantomData;
use std::ptr::NonNull;

/// A lock-free, bounded, multi-producer broadcast queue.
///
/// Publishing never blocks and never fails: when the ring is full the oldest
/// entry is evicted and its buffer recycled. Every [`Subscriber`] walks the
/// ring independently and learns about evicted entries through its drop count.
///
/// `'m` is the lifetime of the memory the queue is placed in; queues built
/// with [`BroadcastQueue::new`] own their memory and are `'static`.
///
/// [`Subscriber`]: super::Subscriber
pub struct BroadcastQueue<'m> {
    pub(crate) header: NonNull<QueueHeader>,
    pub(crate) pool: Pool<'m>,
    pub(crate) owned: Option<HeapRegion>,
    pub(crate) _mem: PhantomData<&'m [u8]>,
}

unsafe impl Send for BroadcastQueue<'_> {}
unsafe impl Sync for BroadcastQueue<'_> {}

/// A buffer taken from the queue and not yet published.
///
/// The caller owns it exclusively. [`BroadcastQueue::publish`] hands it to the
/// queue; dropping it (or [`BroadcastQueue::buffer_release`]) returns it to
/// the pool.
pub struct Buffer<'q> {
    pub(crate) queue: &'q BroadcastQueue<'q>,
    /// Offset from the queue base.
    pub(crate) offset: u64,
}

/// A view of a published buffer returned by `consume_begin`.
///
/// The bytes are shared and volatile: a publisher may evict and rewrite them
/// at any moment, even mid-read. Copy out what you need, then ask
/// `consume_end` whether the copy is trustworthy.
#[derive(Clone, Copy)]
pub struct BufferView<'q> {
    pub(crate) ptr: *const u8,
    pub(crate) len: usize,
    pub(crate) _queue: PhantomData<&'q BroadcastQueue<'q>>,
}
