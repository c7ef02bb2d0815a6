// Lock-free fixed-size element pool.
//
// Free elements form an intrusive list: each free element's first 16 bytes
// hold the tagged reference of the next free element, and the head lives in
// the pool header. Every reference is a byte offset from the pool base, so
// the same bytes work wherever a process maps them.

use crate::error::{Error, Result};
use crate::Core::SharedMemory::{HeapRegion, SharedMemoryBackend};
use crate::Core::TaggedRef::{align_up, is_pow2, RefValue, TaggedRef};
use crossbeam_utils::Backoff;
use portable_atomic::Ordering;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;

mod debug;
mod getters;

/// Alignment (and size) of the pool header.
pub const POOL_ALIGN: usize = 4096;

/// Smallest element alignment: a free element must hold a [`TaggedRef`].
pub const MIN_ELEMENT_ALIGN: usize = std::mem::align_of::<TaggedRef>();

/// Header at the start of every pool. Elements start right after it.
#[repr(C, align(4096))]
pub struct PoolHeader {
    pub num_elements: u64,
    /// Element size as requested at init.
    pub element_size: u64,
    pub element_align: u64,
    /// Distance between consecutive elements.
    pub stride: u64,
    /// Source of free-list tags; bumped on every release.
    pub tag_next: AtomicU64,
    /// Free-list head; `value` is the element offset from the pool base.
    pub head: TaggedRef,
}

/// A handle on a pool placed in memory the handle may or may not own.
pub struct Pool<'m> {
    header: NonNull<PoolHeader>,
    owned: Option<HeapRegion>,
    _mem: PhantomData<&'m [u8]>,
}

unsafe impl Send for Pool<'_> {}
unsafe impl Sync for Pool<'_> {}

/// An element handed out by [`Pool::acquire`]. Dropping it returns it to the pool.
pub struct PoolElement<'p> {
    pool: &'p Pool<'p>,
    offset: u64,
}

/// Effective element stride and alignment, or why the parameters are rejected.
pub(crate) fn element_layout(
    num_elements: usize,
    element_size: usize,
    element_align: usize,
) -> Result<(usize, usize)> {
    if num_elements == 0 {
        return Err(Error::InvalidParameters("element count must be > 0".into()));
    }
    if element_size == 0 {
        return Err(Error::InvalidParameters("element size must be > 0".into()));
    }
    if !is_pow2(element_align) || element_align > POOL_ALIGN {
        return Err(Error::InvalidParameters(format!(
            "element alignment {} must be a power of two <= {}",
            element_align, POOL_ALIGN
        )));
    }
    let align = element_align.max(MIN_ELEMENT_ALIGN);
    Ok((align_up(element_size, align), align))
}

impl Pool<'static> {
    /// A process-local pool on the heap.
    pub fn new(num_elements: usize, element_size: usize, element_align: usize) -> Result<Self> {
        let (size, align) = Self::footprint(num_elements, element_size, element_align)?;
        let region = HeapRegion::new(size, align)?;
        let base = NonNull::new(region.as_ptr()).ok_or(Error::Exhausted)?;
        // SAFETY: the region is exclusively ours and at least `size` bytes.
        let mut pool = unsafe { Pool::mem_init(base, num_elements, element_size, element_align)? };
        pool.owned = Some(region);
        Ok(pool)
    }
}

impl<'m> Pool<'m> {
    /// Bytes and base alignment needed to place a pool.
    pub fn footprint(
        num_elements: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<(usize, usize)> {
        let (stride, _) = element_layout(num_elements, element_size, element_align)?;
        let elements = stride
            .checked_mul(num_elements)
            .ok_or_else(|| Error::InvalidParameters("pool size overflows".into()))?;
        Ok((std::mem::size_of::<PoolHeader>() + elements, POOL_ALIGN))
    }

    /// Format a pool at `mem`, threading every element onto the free list.
    ///
    /// # Safety
    /// `mem` must be valid for `footprint(..)` bytes for `'m` and not in use
    /// by anyone else while it is formatted.
    pub unsafe fn mem_init(
        mem: NonNull<u8>,
        num_elements: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        let (stride, _) = element_layout(num_elements, element_size, element_align)?;
        if (mem.as_ptr() as usize) % POOL_ALIGN != 0 {
            return Err(Error::Misaligned { align: POOL_ALIGN });
        }

        let header = mem.cast::<PoolHeader>();
        header.as_ptr().write(PoolHeader {
            num_elements: num_elements as u64,
            element_size: element_size as u64,
            element_align: element_align as u64,
            stride: stride as u64,
            tag_next: AtomicU64::new(0),
            head: TaggedRef::new(RefValue::NULL),
        });

        let pool = Pool {
            header,
            owned: None,
            _mem: PhantomData,
        };

        // Release back to front so the lowest element comes out first.
        for i in (0..num_elements).rev() {
            pool.release_raw(pool.element_offset(i));
        }

        Ok(pool)
    }

    /// Attach to a pool another handle already formatted.
    ///
    /// # Safety
    /// Same as [`Pool::mem_init`], except the memory must hold a formatted pool.
    pub unsafe fn mem_join(
        mem: NonNull<u8>,
        num_elements: usize,
        element_size: usize,
        element_align: usize,
    ) -> Result<Self> {
        element_layout(num_elements, element_size, element_align)?;
        if (mem.as_ptr() as usize) % POOL_ALIGN != 0 {
            return Err(Error::Misaligned { align: POOL_ALIGN });
        }

        let header = mem.cast::<PoolHeader>();
        let h = header.as_ref();
        if h.num_elements != num_elements as u64
            || h.element_size != element_size as u64
            || h.element_align != element_align as u64
        {
            return Err(Error::LayoutMismatch(format!(
                "pool holds {} x {}B (align {}), expected {} x {}B (align {})",
                h.num_elements, h.element_size, h.element_align, num_elements, element_size, element_align
            )));
        }

        Ok(Pool {
            header,
            owned: None,
            _mem: PhantomData,
        })
    }

    /// Detach. The pool bytes are left untouched for other attachments.
    pub fn mem_leave(self) {}

    #[inline]
    pub(crate) fn header(&self) -> &PoolHeader {
        // SAFETY: the header outlives 'm by construction.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.header.as_ptr() as *mut u8
    }

    #[inline]
    fn element_offset(&self, index: usize) -> u64 {
        (std::mem::size_of::<PoolHeader>() as u64) + index as u64 * self.header().stride
    }

    #[inline]
    fn link(&self, offset: u64) -> &TaggedRef {
        // SAFETY: offsets handed around are element offsets inside the pool,
        // and elements are at least 16-byte aligned and 16 bytes long.
        unsafe { TaggedRef::from_ptr(self.base().add(offset as usize)) }
    }

    /// Pop a free element; returns its offset from the pool base.
    pub(crate) fn acquire_raw(&self) -> Option<u64> {
        let head = &self.header().head;
        let backoff = Backoff::new();
        loop {
            let cur = head.load(Ordering::Acquire);
            if cur.is_null() {
                return None;
            }
            // The element may already have been taken and scribbled on by a
            // racing acquirer; the head's tag has then moved and the CAS fails.
            let next = self.link(cur.value).load(Ordering::Acquire);
            if head.compare_exchange(cur, next) {
                return Some(cur.value);
            }
            backoff.spin();
        }
    }

    /// Push an element back onto the free list.
    ///
    /// Caller guarantees nothing else references the element.
    pub(crate) fn release_raw(&self, offset: u64) {
        let h = self.header();
        let tag = h.tag_next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        let next = RefValue::new(tag, offset);
        let link = self.link(offset);
        let backoff = Backoff::new();
        loop {
            let cur = h.head.load(Ordering::Acquire);
            link.store(cur, Ordering::Relaxed);
            if h.head.compare_exchange(cur, next) {
                return;
            }
            backoff.spin();
        }
    }

    /// Take an element. An empty pool is a normal outcome.
    pub fn acquire(&self) -> Option<PoolElement<'_>> {
        self.acquire_raw().map(|offset| PoolElement { pool: self, offset })
    }

    /// Return an element; equivalent to dropping it.
    pub fn release(&self, elt: PoolElement<'_>) {
        debug_assert!(std::ptr::eq(elt.pool.base(), self.base()), "element from another pool");
        drop(elt);
    }

    /// Count free elements by walking the list. Diagnostic only: the answer
    /// is stale as soon as it is returned if other threads are active.
    pub fn free_count(&self) -> usize {
        let limit = self.num_elements();
        let mut n = 0;
        let mut cur = self.header().head.load(Ordering::Acquire);
        while !cur.is_null() && n < limit {
            n += 1;
            cur = self.link(cur.value).load(Ordering::Acquire);
        }
        n
    }
}

impl PoolElement<'_> {
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: offset is an element offset inside the pool.
        unsafe { self.pool.base().add(self.offset as usize) }
    }

    /// Usable bytes in the element (the size the pool was created with).
    pub fn len(&self) -> usize {
        self.pool.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: we own the element until drop.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: we own the element until drop.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), self.len()) }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Drop for PoolElement<'_> {
    fn drop(&mut self) {
        self.pool.release_raw(self.offset);
    }
}
