// Tagged references: a 64-bit value and a 64-bit tag updated together
// through one 128-bit compare-and-exchange.

use portable_atomic::{AtomicU128, Ordering};
use std::fmt;

/// Cache line size assumed by the shared layouts.
pub const CACHE_LINE: usize = 128;

/// A plain snapshot of a [`TaggedRef`].
///
/// `value` is usually a base-relative byte offset, `tag` a logical index or
/// a monotonic stamp. The all-zero snapshot means "unused".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RefValue {
    pub value: u64,
    pub tag: u64,
}

impl RefValue {
    pub const NULL: RefValue = RefValue { value: 0, tag: 0 };

    #[inline]
    pub const fn new(tag: u64, value: u64) -> Self {
        Self { value, tag }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.value == 0 && self.tag == 0
    }

    #[inline]
    const fn pack(self) -> u128 {
        ((self.tag as u128) << 64) | self.value as u128
    }

    #[inline]
    const fn unpack(raw: u128) -> Self {
        Self {
            value: raw as u64,
            tag: (raw >> 64) as u64,
        }
    }
}

/// An atomically updatable `(value, tag)` pair.
///
/// Layout is a single native-endian `u128`: value in the low 64 bits, tag in
/// the high 64 bits. The type lives inside shared memory, so it must stay
/// `repr(transparent)` over the atomic.
#[repr(transparent)]
#[derive(Default)]
pub struct TaggedRef(AtomicU128);

impl TaggedRef {
    pub const fn new(v: RefValue) -> Self {
        Self(AtomicU128::new(v.pack()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> RefValue {
        RefValue::unpack(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, v: RefValue, order: Ordering) {
        self.0.store(v.pack(), order)
    }

    /// Single compare-and-exchange over both halves. Returns `true` on success.
    #[inline]
    pub fn compare_exchange(&self, current: RefValue, new: RefValue) -> bool {
        self.0
            .compare_exchange(current.pack(), new.pack(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether 128-bit operations are native on this CPU. When they are not,
    /// `portable-atomic` serializes through a process-local lock table, which
    /// still works inside one process but not across processes.
    pub fn is_lock_free() -> bool {
        AtomicU128::is_lock_free()
    }

    /// View the 16 bytes at `ptr` as a tagged reference.
    ///
    /// # Safety
    /// `ptr` must be 16-byte aligned, valid for reads and writes for `'a`, and
    /// only ever accessed atomically while the reference is alive.
    #[inline]
    pub unsafe fn from_ptr<'a>(ptr: *mut u8) -> &'a TaggedRef {
        debug_assert_eq!(ptr as usize % std::mem::align_of::<TaggedRef>(), 0);
        &*(ptr as *const TaggedRef)
    }
}

impl fmt::Debug for TaggedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.load(Ordering::Relaxed);
        f.debug_struct("TaggedRef")
            .field("value", &v.value)
            .field("tag", &v.tag)
            .finish()
    }
}

#[inline]
pub const fn is_pow2(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Round `size` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + (align - 1)) & !(align - 1)
}
