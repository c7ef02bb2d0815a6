// Layout conformance tests for the shared region.
// Every process that maps a region must agree on these offsets, so they are
// pinned here. Observed values are printed to help when a platform disagrees.
use lf_bcast::Core::pool::PoolHeader;
use lf_bcast::Core::TaggedRef::TaggedRef;
use lf_bcast::MPMC::Bcast::layout::{QueueHeader, HEADER_SIZE};
use lf_bcast::MPMC::Queue::WorkQueueHeader;
use lf_bcast::MPMC::Structs::{MessageMeta, FRAME_HEADER};
use lf_bcast::{BroadcastQueue, Pool, WorkQueue};
use memoffset::offset_of;
use std::mem::{align_of, size_of};

#[test]
fn test_tagged_ref_layout() {
    println!(
        "TaggedRef => size: {}, align: {}, lock_free: {}",
        size_of::<TaggedRef>(),
        align_of::<TaggedRef>(),
        TaggedRef::is_lock_free()
    );
    assert_eq!(size_of::<TaggedRef>(), 16);
    assert_eq!(align_of::<TaggedRef>(), 16);
}

#[test]
fn test_queue_header_layout() {
    let size = size_of::<QueueHeader>();
    let align = align_of::<QueueHeader>();
    println!(
        "QueueHeader => size: {size}, align: {align}, offsets: [depth_mask:{}, element_size:{}, head_idx:{}, tail_idx:{}, pool_off:{}, element_align:{}, magic:{}, version:{}]",
        offset_of!(QueueHeader, depth_mask),
        offset_of!(QueueHeader, element_size),
        offset_of!(QueueHeader, head_idx),
        offset_of!(QueueHeader, tail_idx),
        offset_of!(QueueHeader, pool_off),
        offset_of!(QueueHeader, element_align),
        offset_of!(QueueHeader, magic),
        offset_of!(QueueHeader, version),
    );

    assert_eq!(size, 128);
    assert_eq!(align, 128);
    assert_eq!(HEADER_SIZE, 128);
    assert_eq!(offset_of!(QueueHeader, depth_mask), 0);
    assert_eq!(offset_of!(QueueHeader, element_size), 8);
    assert_eq!(offset_of!(QueueHeader, head_idx), 16);
    assert_eq!(offset_of!(QueueHeader, tail_idx), 24);
    assert_eq!(offset_of!(QueueHeader, pool_off), 32);
    assert_eq!(offset_of!(QueueHeader, element_align), 40);
    assert_eq!(offset_of!(QueueHeader, magic), 48);
    assert_eq!(offset_of!(QueueHeader, version), 56);
    assert_eq!(offset_of!(QueueHeader, _reserved), 60);
}

#[test]
fn test_pool_header_layout() {
    assert_eq!(size_of::<PoolHeader>(), 4096);
    assert_eq!(align_of::<PoolHeader>(), 4096);
    assert_eq!(offset_of!(PoolHeader, num_elements), 0);
    assert_eq!(offset_of!(PoolHeader, element_size), 8);
    assert_eq!(offset_of!(PoolHeader, element_align), 16);
    assert_eq!(offset_of!(PoolHeader, stride), 24);
    assert_eq!(offset_of!(PoolHeader, tag_next), 32);
    // TaggedRef is 16-aligned, so the head skips a word.
    assert_eq!(offset_of!(PoolHeader, head), 48);
}

#[test]
fn test_message_meta_layout() {
    let size = size_of::<MessageMeta>();
    println!(
        "MessageMeta => size: {size}, align: {}, offsets: [sequence:{}, timestamp_ns:{}, sender_pid:{}, payload_len:{}]",
        align_of::<MessageMeta>(),
        offset_of!(MessageMeta, sequence),
        offset_of!(MessageMeta, timestamp_ns),
        offset_of!(MessageMeta, sender_pid),
        offset_of!(MessageMeta, payload_len),
    );
    assert_eq!(size, 24);
    assert_eq!(FRAME_HEADER, size);
    assert_eq!(align_of::<MessageMeta>(), align_of::<u64>());
    assert_eq!(offset_of!(MessageMeta, sequence), 0);
    assert_eq!(offset_of!(MessageMeta, timestamp_ns), 8);
    assert_eq!(offset_of!(MessageMeta, sender_pid), 16);
    assert_eq!(offset_of!(MessageMeta, payload_len), 20);
}

#[test]
fn test_work_queue_header_layout() {
    assert_eq!(size_of::<WorkQueueHeader>(), 128);
    assert_eq!(offset_of!(WorkQueueHeader, head_idx), 8);
    assert_eq!(offset_of!(WorkQueueHeader, tail_idx), 16);
    assert_eq!(WorkQueue::footprint(8).unwrap(), (128 + 8 * 16, 128));
}

#[test]
fn test_footprints() {
    // Pool: 4096-byte header, then elements rounded up to 16 bytes.
    assert_eq!(Pool::footprint(2, 8, 16).unwrap(), (4096 + 2 * 16, 4096));
    assert_eq!(Pool::footprint(3, 100, 64).unwrap(), (4096 + 3 * 128, 4096));

    // Queue: header + slots, pool at the next 4096 boundary.
    assert_eq!(
        BroadcastQueue::footprint(2, 8, 16).unwrap(),
        (4096 + 4096 + 2 * 16, 4096)
    );
    // 128 + 256 * 16 = 4224 bytes of header and slots, so the pool starts at 8192.
    assert_eq!(
        BroadcastQueue::footprint(256, 64, 16).unwrap(),
        (8192 + 4096 + 256 * 64, 4096)
    );
}
