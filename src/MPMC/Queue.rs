// Bounded lock-free MPMC work queue of u64 values.
//
// Same slot scheme as the broadcast queue (unwrapped logical indices stamped
// into tagged slots) but every value is consumed exactly once, and a full
// queue rejects instead of evicting.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::Backoff;

use crate::error::{Error, Result};
use crate::Core::SharedMemory::{HeapRegion, SharedMemoryBackend};
use crate::Core::TaggedRef::{is_pow2, RefValue, TaggedRef, CACHE_LINE};

/// "LFQUEUE1"
const QUEUE_MAGIC: u64 = 0x4C46_5155_4555_4531;

#[repr(C, align(128))]
pub struct WorkQueueHeader {
    pub depth_mask: u64,
    pub head_idx: AtomicU64,
    pub tail_idx: AtomicU64,
    pub magic: AtomicU64,
}

const HEADER_SIZE: usize = size_of::<WorkQueueHeader>();

pub struct WorkQueue<'m> {
    header: NonNull<WorkQueueHeader>,
    owned: Option<HeapRegion>,
    _mem: PhantomData<&'m [u8]>,
}

unsafe impl Send for WorkQueue<'_> {}
unsafe impl Sync for WorkQueue<'_> {}

impl WorkQueue<'static> {
    pub fn new(depth: usize) -> Result<Self> {
        let (size, align) = Self::footprint(depth)?;
        let region = HeapRegion::new(size, align)?;
        let base = NonNull::new(region.as_ptr()).ok_or(Error::Exhausted)?;
        // SAFETY: fresh, exclusively owned, correctly sized.
        let mut q = unsafe { WorkQueue::mem_init(base, depth)? };
        q.owned = Some(region);
        Ok(q)
    }
}

impl<'m> WorkQueue<'m> {
    pub fn footprint(depth: usize) -> Result<(usize, usize)> {
        if !is_pow2(depth) {
            return Err(Error::InvalidParameters(format!(
                "depth {} must be a non-zero power of two",
                depth
            )));
        }
        Ok((HEADER_SIZE + depth * size_of::<TaggedRef>(), CACHE_LINE))
    }

    /// # Safety
    /// `mem` must be valid for `footprint(depth)` bytes for `'m`, unused by
    /// anyone else until this returns.
    pub unsafe fn mem_init(mem: NonNull<u8>, depth: usize) -> Result<Self> {
        let (_, align) = Self::footprint(depth)?;
        if (mem.as_ptr() as usize) % align != 0 {
            return Err(Error::Misaligned { align });
        }
        let header = mem.cast::<WorkQueueHeader>();
        header.as_ptr().write(WorkQueueHeader {
            depth_mask: (depth - 1) as u64,
            head_idx: AtomicU64::new(1),
            tail_idx: AtomicU64::new(1),
            magic: AtomicU64::new(0),
        });
        ptr::write_bytes(mem.as_ptr().add(HEADER_SIZE), 0, depth * size_of::<TaggedRef>());
        header.as_ref().magic.store(QUEUE_MAGIC, Release);
        Ok(WorkQueue {
            header,
            owned: None,
            _mem: PhantomData,
        })
    }

    /// # Safety
    /// `mem` must be valid for `footprint(depth)` bytes for `'m`.
    pub unsafe fn mem_join(mem: NonNull<u8>, depth: usize) -> Result<Self> {
        let (_, align) = Self::footprint(depth)?;
        if (mem.as_ptr() as usize) % align != 0 {
            return Err(Error::Misaligned { align });
        }
        let header = mem.cast::<WorkQueueHeader>();
        let h = header.as_ref();
        if h.magic.load(Acquire) != QUEUE_MAGIC {
            return Err(Error::LayoutMismatch("region is not a formatted work queue".into()));
        }
        if h.depth_mask != (depth - 1) as u64 {
            return Err(Error::LayoutMismatch(format!(
                "work queue depth {} != {}",
                h.depth_mask + 1,
                depth
            )));
        }
        Ok(WorkQueue {
            header,
            owned: None,
            _mem: PhantomData,
        })
    }

    pub fn mem_leave(self) {}

    #[inline]
    fn header(&self) -> &WorkQueueHeader {
        // SAFETY: valid for 'm.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    fn slot(&self, idx: u64) -> &TaggedRef {
        let i = (idx & self.header().depth_mask) as usize;
        // SAFETY: i < depth; slots follow the header.
        unsafe {
            TaggedRef::from_ptr(
                (self.header.as_ptr() as *mut u8).add(HEADER_SIZE + i * size_of::<TaggedRef>()),
            )
        }
    }

    /// Append `val`. Returns `false` if the queue is full.
    pub fn enqueue(&self, val: u64) -> bool {
        let h = self.header();
        let backoff = Backoff::new();
        loop {
            let head_idx = h.head_idx.load(Acquire);
            let tail_idx = h.tail_idx.load(Acquire);
            let slot = self.slot(tail_idx);
            let cur = slot.load(Acquire);

            if cur.tag == tail_idx {
                let _ = h.tail_idx.compare_exchange(tail_idx, tail_idx + 1, AcqRel, Relaxed);
                backoff.spin();
                continue;
            }
            if cur.tag > tail_idx {
                backoff.spin();
                continue;
            }
            // Slot still holds an undequeued value.
            if head_idx <= cur.tag {
                return false;
            }

            if !slot.compare_exchange(cur, RefValue::new(tail_idx, val)) {
                backoff.spin();
                continue;
            }
            let _ = h.tail_idx.compare_exchange(tail_idx, tail_idx + 1, AcqRel, Relaxed);
            return true;
        }
    }

    /// Take the oldest value, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<u64> {
        let h = self.header();
        let backoff = Backoff::new();
        loop {
            let head_idx = h.head_idx.load(Acquire);
            let tail_idx = h.tail_idx.load(Acquire);
            let cur = self.slot(head_idx).load(Acquire);

            if cur.tag != head_idx {
                if head_idx >= tail_idx && cur.tag < head_idx {
                    return None;
                }
                // Our head snapshot is stale.
                backoff.spin();
                continue;
            }
            if head_idx >= tail_idx {
                // Written but the tail was not advanced yet.
                let _ = h.tail_idx.compare_exchange(tail_idx, tail_idx + 1, AcqRel, Relaxed);
                backoff.spin();
                continue;
            }

            // Once the head moves past this slot it may be rewritten, so the
            // value must be read before the CAS.
            let val = cur.value;
            if h
                .head_idx
                .compare_exchange(head_idx, head_idx + 1, AcqRel, Relaxed)
                .is_err()
            {
                backoff.spin();
                continue;
            }
            return Some(val);
        }
    }

    pub fn depth(&self) -> usize {
        (self.header().depth_mask + 1) as usize
    }

    pub fn head_index(&self) -> u64 {
        self.header().head_idx.load(Acquire)
    }

    pub fn tail_index(&self) -> u64 {
        self.header().tail_idx.load(Acquire)
    }

    pub fn len(&self) -> usize {
        self.tail_index().saturating_sub(self.head_index()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}

impl std::fmt::Debug for WorkQueue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_work_queue(self, f)
    }
}
