use std::marker::PhantomData;
use std::mem::{size_of, ManuallyDrop};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::Backoff;

use super::layout::{QueueHeader, BCAST_MAGIC, FIRST_INDEX, HEADER_SIZE, LAYOUT_VERSION};
use super::subscriber::Subscriber;
use super::Bcast::{BroadcastQueue, Buffer, BufferView};
use crate::error::{Error, Result};
use crate::Core::futex;
use crate::Core::pool::{Pool, POOL_ALIGN};
use crate::Core::SharedMemory::{HeapRegion, SharedMemoryBackend};
use crate::Core::TaggedRef::{align_up, is_pow2, RefValue, TaggedRef};

/// Default element alignment: enough to hold a tagged reference.
pub const DEFAULT_ALIGN: usize = 16;

/// Offset of the embedded pool for a queue of `depth` slots.
fn pool_offset(depth: usize) -> usize {
    align_up(HEADER_SIZE + depth * size_of::<TaggedRef>(), POOL_ALIGN)
}

fn check_depth(depth: usize) -> Result<()> {
    if !is_pow2(depth) {
        return Err(Error::InvalidParameters(format!(
            "depth {} must be a non-zero power of two",
            depth
        )));
    }
    Ok(())
}

impl BroadcastQueue<'static> {
    /// A process-local queue with default element alignment.
    pub fn new(depth: usize, element_size: usize) -> Result<Self> {
        Self::with_align(depth, element_size, DEFAULT_ALIGN)
    }

    /// A process-local queue whose buffers are aligned to `element_align`.
    pub fn with_align(depth: usize, element_size: usize, element_align: usize) -> Result<Self> {
        let (size, align) = Self::footprint(depth, element_size, element_align)?;
        let region = HeapRegion::new(size, align)?;
        let base = NonNull::new(region.as_ptr()).ok_or(Error::Exhausted)?;
        // SAFETY: fresh, exclusively owned, `size` bytes, `align`-aligned.
        let mut queue = unsafe { BroadcastQueue::mem_init(base, depth, element_size, element_align)? };
        queue.owned = Some(region);
        Ok(queue)
    }
}

impl<'m> BroadcastQueue<'m> {
    /// Bytes and base alignment a region needs to host this queue.
    pub fn footprint(
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<(usize, usize)> {
        check_depth(depth)?;
        let (pool_size, pool_align) = Pool::footprint(depth, element_size, element_align)?;
        Ok((pool_offset(depth) + pool_size, pool_align.max(HEADER_SIZE)))
    }

    /// Format a fresh region: header, zeroed slots and the embedded pool.
    ///
    /// # Safety
    /// `mem` must be valid for `footprint(..)` bytes for `'m`, and nobody may
    /// use the region until this returns.
    pub unsafe fn mem_init(
        mem: NonNull<u8>,
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        let (_, align) = Self::footprint(depth, element_size, element_align)?;
        if (mem.as_ptr() as usize) % align != 0 {
            return Err(Error::Misaligned { align });
        }
        if !TaggedRef::is_lock_free() {
            tracing::warn!("128-bit atomics are emulated; the queue is only safe within one process");
        }

        let pool_off = pool_offset(depth);
        let header = mem.cast::<QueueHeader>();
        header.as_ptr().write(QueueHeader {
            depth_mask: (depth - 1) as u64,
            element_size: element_size as u64,
            head_idx: AtomicU64::new(FIRST_INDEX),
            tail_idx: AtomicU64::new(FIRST_INDEX),
            pool_off: pool_off as u64,
            element_align: element_align as u64,
            magic: AtomicU64::new(0),
            version: AtomicU32::new(LAYOUT_VERSION),
            _reserved: 0,
        });
        ptr::write_bytes(mem.as_ptr().add(HEADER_SIZE), 0, depth * size_of::<TaggedRef>());

        let pool_mem = NonNull::new_unchecked(mem.as_ptr().add(pool_off));
        let pool = Pool::mem_init(pool_mem, depth, element_size, element_align)?;

        header.as_ref().magic.store(BCAST_MAGIC, Release);
        tracing::debug!(depth, element_size, element_align, "formatted broadcast queue");

        Ok(BroadcastQueue {
            header,
            pool,
            owned: None,
            _mem: PhantomData,
        })
    }

    /// Attach to a region another process (or handle) formatted.
    ///
    /// Fails unless the region is formatted and its depth, element size and
    /// alignment match. No process-local state is created besides the handle.
    ///
    /// # Safety
    /// `mem` must be valid for `footprint(..)` bytes for `'m`.
    pub unsafe fn mem_join(
        mem: NonNull<u8>,
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        let (_, align) = Self::footprint(depth, element_size, element_align)?;
        if (mem.as_ptr() as usize) % align != 0 {
            return Err(Error::Misaligned { align });
        }

        let header = mem.cast::<QueueHeader>();
        let h = header.as_ref();
        if h.magic.load(Acquire) != BCAST_MAGIC {
            tracing::warn!("join refused: region is not a formatted broadcast queue");
            return Err(Error::LayoutMismatch("region is not formatted".into()));
        }
        let version = h.version.load(Relaxed);
        if version != LAYOUT_VERSION {
            return Err(Error::LayoutMismatch(format!(
                "layout version {} != {}",
                version, LAYOUT_VERSION
            )));
        }
        if h.depth_mask != (depth - 1) as u64
            || h.element_size != element_size as u64
            || h.element_align != element_align as u64
        {
            tracing::warn!(
                depth,
                element_size,
                found_depth = h.depth_mask + 1,
                found_element_size = h.element_size,
                "join refused: parameters mismatch"
            );
            return Err(Error::LayoutMismatch(format!(
                "region holds depth {} x {}B (align {}), expected depth {} x {}B (align {})",
                h.depth_mask + 1,
                h.element_size,
                h.element_align,
                depth,
                element_size,
                element_align
            )));
        }
        if h.pool_off != pool_offset(depth) as u64 {
            return Err(Error::LayoutMismatch(format!("pool offset {}", h.pool_off)));
        }

        let pool_mem = NonNull::new_unchecked(mem.as_ptr().add(h.pool_off as usize));
        let pool = Pool::mem_join(pool_mem, depth, element_size, element_align)?;

        tracing::debug!(depth, element_size, "joined broadcast queue");
        Ok(BroadcastQueue {
            header,
            pool,
            owned: None,
            _mem: PhantomData,
        })
    }

    /// Detach without touching the shared bytes.
    pub fn mem_leave(self) {
        let BroadcastQueue { pool, .. } = self;
        pool.mem_leave();
    }

    /// Format a queue inside `backend` after checking its size and alignment.
    pub fn init_in<B: SharedMemoryBackend + ?Sized>(
        backend: &'m B,
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        let base = Self::check_backend(backend, depth, element_size, element_align)?;
        // SAFETY: size and alignment were checked; the borrow keeps the mapping alive.
        unsafe { Self::mem_init(base, depth, element_size, element_align) }
    }

    /// Join a queue inside `backend` after checking its size and alignment.
    pub fn join_in<B: SharedMemoryBackend + ?Sized>(
        backend: &'m B,
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        let base = Self::check_backend(backend, depth, element_size, element_align)?;
        // SAFETY: as above.
        unsafe { Self::mem_join(base, depth, element_size, element_align) }
    }

    pub(crate) fn check_backend<B: SharedMemoryBackend + ?Sized>(
        backend: &B,
        depth: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<NonNull<u8>> {
        let (required, align) = Self::footprint(depth, element_size, element_align)?;
        if backend.size() < required {
            return Err(Error::RegionTooSmall {
                required,
                actual: backend.size(),
            });
        }
        let base = NonNull::new(backend.as_ptr()).ok_or(Error::Misaligned { align })?;
        if (base.as_ptr() as usize) % align != 0 {
            return Err(Error::Misaligned { align });
        }
        Ok(base)
    }

    #[inline]
    pub(crate) fn header(&self) -> &QueueHeader {
        // SAFETY: the header lives as long as 'm.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.header.as_ptr() as *mut u8
    }

    #[inline]
    pub(crate) fn slot(&self, idx: u64) -> &TaggedRef {
        let h = self.header();
        let i = (idx & h.depth_mask) as usize;
        // SAFETY: i < depth and the slot array follows the header.
        unsafe { TaggedRef::from_ptr(self.base().add(HEADER_SIZE + i * size_of::<TaggedRef>())) }
    }

    #[inline]
    fn pool_off(&self) -> u64 {
        self.header().pool_off
    }

    #[inline]
    pub(crate) fn tail_word(&self) -> *const u32 {
        futex::low_word(&self.header().tail_idx)
    }

    /// Evict the entry at `head_idx` if it is still the head. On success the
    /// caller owns the evicted buffer (offset from the queue base).
    fn try_drop_head(&self, head_idx: u64) -> Option<u64> {
        let h = self.header();
        let cur = self.slot(head_idx).load(Acquire);
        if cur.tag != head_idx {
            return None;
        }
        if h
            .head_idx
            .compare_exchange(head_idx, head_idx + 1, AcqRel, Relaxed)
            .is_err()
        {
            return None;
        }
        // A crash between the CAS above and the caller taking ownership leaks
        // this one buffer; the ring itself stays consistent.
        Some(cur.value)
    }

    fn recycle(&self, offset: u64) {
        self.pool.release_raw(offset - self.pool_off());
    }

    /// Take a buffer to fill and publish.
    ///
    /// Prefers the pool; when the pool is empty, evicts the oldest entry and
    /// hands out its buffer instead. `None` only when neither works, i.e.
    /// every buffer is held by callers.
    pub fn buffer_acquire(&self) -> Option<Buffer<'_>> {
        let h = self.header();
        let backoff = Backoff::new();
        loop {
            if let Some(rel) = self.pool.acquire_raw() {
                return Some(Buffer {
                    queue: self,
                    offset: rel + self.pool_off(),
                });
            }

            let head_idx = h.head_idx.load(Acquire);
            let tail_idx = h.tail_idx.load(Acquire);
            if head_idx >= tail_idx {
                return None;
            }
            if let Some(offset) = self.try_drop_head(head_idx) {
                return Some(Buffer { queue: self, offset });
            }
            backoff.spin();
        }
    }

    /// Return an unpublished buffer to the pool.
    pub fn buffer_release(&self, buf: Buffer<'_>) {
        debug_assert!(ptr::eq(buf.queue.base(), self.base()), "buffer from another queue");
        drop(buf);
    }

    /// Append `buf` to the ring and wake blocked subscribers.
    ///
    /// Never blocks and never fails. If the ring is full the oldest entry is
    /// evicted first. The buffer belongs to the queue afterwards.
    pub fn publish(&self, buf: Buffer<'_>) {
        debug_assert!(ptr::eq(buf.queue.base(), self.base()), "buffer from another queue");
        let buf = ManuallyDrop::new(buf);
        let buf_off = buf.offset;

        let h = self.header();
        let backoff = Backoff::new();
        loop {
            let head_idx = h.head_idx.load(Acquire);
            let tail_idx = h.tail_idx.load(Acquire);
            let slot = self.slot(tail_idx);
            let cur = slot.load(Acquire);

            // Slot already written for this index: the tail counter is stale.
            if cur.tag == tail_idx {
                let _ = h
                    .tail_idx
                    .compare_exchange(tail_idx, tail_idx + 1, AcqRel, Relaxed);
                backoff.spin();
                continue;
            }

            // Our tail snapshot is older than the slot.
            if cur.tag > tail_idx {
                backoff.spin();
                continue;
            }

            // Slot still holds a live entry: the ring is full, roll off the head.
            if head_idx <= cur.tag {
                if let Some(evicted) = self.try_drop_head(head_idx) {
                    self.recycle(evicted);
                }
                backoff.spin();
                continue;
            }

            if !slot.compare_exchange(cur, RefValue::new(tail_idx, buf_off)) {
                backoff.spin();
                continue;
            }

            // Committed. Advancing the tail is best-effort; anyone who finds it
            // stale fixes it.
            let _ = h
                .tail_idx
                .compare_exchange(tail_idx, tail_idx + 1, AcqRel, Relaxed);
            futex::futex_wake_all(self.tail_word());
            return;
        }
    }

    /// A cursor that sees everything published from now on.
    pub fn subscribe(&self) -> Subscriber<'_> {
        Subscriber::new(self)
    }

    /// A cursor starting at the oldest entry still in the ring.
    pub fn subscribe_from_oldest(&self) -> Subscriber<'_> {
        Subscriber::from_oldest(self)
    }

    /// A view of the buffer at `offset` from the queue base.
    pub(crate) fn view(&self, offset: u64) -> BufferView<'_> {
        BufferView {
            // SAFETY: slot values are buffer offsets inside the region.
            ptr: unsafe { self.base().add(offset as usize) },
            len: self.element_size(),
            _queue: PhantomData,
        }
    }

    pub fn depth(&self) -> usize {
        (self.header().depth_mask + 1) as usize
    }

    /// Maximum payload bytes per buffer.
    pub fn element_size(&self) -> usize {
        self.header().element_size as usize
    }

    pub fn element_align(&self) -> usize {
        self.header().element_align as usize
    }

    pub fn head_index(&self) -> u64 {
        self.header().head_idx.load(Acquire)
    }

    pub fn tail_index(&self) -> u64 {
        self.header().tail_idx.load(Acquire)
    }

    /// Entries currently retained. A snapshot; may be stale immediately.
    pub fn len(&self) -> usize {
        let head = self.head_index();
        let tail = self.tail_index();
        tail.saturating_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The embedded pool.
    pub fn pool(&self) -> &Pool<'m> {
        &self.pool
    }

    /// Whether this handle owns its memory (built with [`BroadcastQueue::new`]).
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}

impl Buffer<'_> {
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: offset points at a pool element inside the region.
        unsafe { self.queue.base().add(self.offset as usize) }
    }

    pub fn len(&self) -> usize {
        self.queue.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the buffer is exclusively ours until published or released.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), self.len()) }
    }

    /// Copy `data` to the start of the buffer.
    ///
    /// Fails with `Error::MessageTooLarge` if `data` exceeds the element size;
    /// the buffer is left untouched.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let max = self.len();
        if data.len() > max {
            return Err(Error::MessageTooLarge {
                len: data.len(),
                max,
            });
        }
        self.as_mut_slice()[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        self.queue.recycle(self.offset);
    }
}

impl<'q> BufferView<'q> {
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy up to `out.len()` bytes out of the buffer; returns the count.
    /// The copy may be torn; only trust it if `consume_end` returns `true`.
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        self.read_at(0, out)
    }

    /// Like [`read_into`](Self::read_into), starting `offset` bytes in.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let n = out.len().min(self.len - offset);
        // SAFETY: in bounds and the buffer stays mapped for 'q; concurrent
        // rewrites only produce torn data, which consume_end reports.
        unsafe { ptr::copy_nonoverlapping(self.ptr.add(offset), out.as_mut_ptr(), n) };
        n
    }

    /// Borrow the bytes directly.
    ///
    /// # Safety
    /// The bytes may change while the slice is alive. The caller must not rely
    /// on anything derived from it unless `consume_end` returns `true`.
    pub unsafe fn as_slice(&self) -> &'q [u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}
