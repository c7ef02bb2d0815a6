use std::sync::atomic::{AtomicU32, AtomicU64};

/// "LFBCAST1"; written last by `mem_init`, checked first by `mem_join`.
pub const BCAST_MAGIC: u64 = 0x4C46_4243_4153_5431;

/// Bumped whenever the byte layout below changes.
pub const LAYOUT_VERSION: u32 = 1;

/// Queue header at the very beginning of a broadcast region.
///
/// Layout of a region, all offsets relative to the header:
///
/// ```text
/// 0                 QueueHeader (128 bytes)
/// 128               slots: [TaggedRef; depth]
/// pool_off          PoolHeader (4096 bytes, pool_off is 4096-aligned)
/// pool_off + 4096   depth elements of `stride` bytes
/// ```
///
/// Slot values and pool offsets are base-relative, never addresses, so every
/// process can map the region wherever it likes.
#[repr(C, align(128))]
pub struct QueueHeader {
    /// depth - 1; depth is a power of two.
    pub depth_mask: u64,

    /// Maximum payload per publish, as requested at init.
    pub element_size: u64,

    /// Logical index of the oldest retained entry.
    pub head_idx: AtomicU64,

    /// Logical index the next publish will take. Waiters sleep on its low half.
    pub tail_idx: AtomicU64,

    /// Byte offset of the embedded pool from the header.
    pub pool_off: u64,

    pub element_align: u64,

    /// [`BCAST_MAGIC`] once the region is fully formatted.
    pub magic: AtomicU64,

    pub version: AtomicU32,

    pub _reserved: u32,
}

/// Size of the header; slots start right after it.
pub const HEADER_SIZE: usize = std::mem::size_of::<QueueHeader>();

/// Logical indices start at 1: a zeroed slot (tag 0) is "never written".
pub const FIRST_INDEX: u64 = 1;
