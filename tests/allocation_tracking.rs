// Allocation tracking for the hot paths.
//
// Publishing and consuming work entirely inside memory set up at init, so
// they must not touch the heap. Both tests are serial: dhat allows one
// profiler at a time, and concurrent tests would pollute the counts.
//
// cargo test --test allocation_tracking -- --nocapture

use lf_bcast::{BroadcastQueue, Publisher, Receiver};
use std::time::Duration;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const POLL: Option<Duration> = Some(Duration::ZERO);

#[test]
#[serial_test::serial]
fn test_publish_consume_with_dhat() {
    let q = BroadcastQueue::new(64, 256).unwrap();
    let mut sub = q.subscribe();
    let mut out = [0u8; 256];

    let _profiler = dhat::Profiler::builder().testing().build();
    let before = dhat::HeapStats::get();

    for i in 0..10_000u64 {
        let mut buf = q.buffer_acquire().expect("buffer");
        buf.write(&i.to_le_bytes()).unwrap();
        q.publish(buf);
        if i % 4 == 0 {
            while let Some(view) = sub.consume_begin(POLL) {
                view.read_into(&mut out);
                sub.consume_end();
            }
        }
    }

    let after = dhat::HeapStats::get();
    println!("before: {:?}\nafter: {:?}", before, after);
    assert_eq!(after.total_blocks, before.total_blocks, "hot path allocated");
    assert!(sub.next_index() > 9_000);
}

#[test]
#[serial_test::serial]
fn test_copying_api_with_dhat() {
    let q = BroadcastQueue::new(64, 256).unwrap();
    let publisher = Publisher::new(&q);
    let mut receiver = Receiver::new(&q);
    let payload = [7u8; 100];
    let mut out = [0u8; 256];

    let _profiler = dhat::Profiler::builder().testing().build();
    let before = dhat::HeapStats::get();

    for _ in 0..5_000 {
        publisher.send(payload).expect("send");
        let got = receiver.recv(&mut out, POLL).expect("recv");
        assert_eq!(got.len, 100);
    }

    let after = dhat::HeapStats::get();
    assert_eq!(after.total_blocks, before.total_blocks, "copying path allocated");
}

#[test]
#[serial_test::serial]
fn test_publish_consume_with_memory_stats() {
    use memory_stats::memory_stats;

    let q = BroadcastQueue::new(1024, 1024).unwrap();
    let mut sub = q.subscribe();
    let mut out = [0u8; 1024];

    // Touch every buffer once so the pages are resident before measuring.
    for _ in 0..2048 {
        let buf = q.buffer_acquire().unwrap();
        q.publish(buf);
    }
    while let Some(view) = sub.consume_begin(POLL) {
        view.read_into(&mut out);
        sub.consume_end();
    }

    let before = memory_stats();
    for i in 0..100_000u64 {
        let mut buf = q.buffer_acquire().unwrap();
        buf.write(&i.to_le_bytes()).unwrap();
        q.publish(buf);
        if let Some(view) = sub.consume_begin(POLL) {
            view.read_into(&mut out);
            sub.consume_end();
        }
    }
    let after = memory_stats();
    println!("Memory before: {:?}\nMemory after: {:?}", before, after);

    if let (Some(b), Some(a)) = (before, after) {
        let delta = a.physical_mem as i64 - b.physical_mem as i64;
        println!("Memory delta: {} bytes ({:.2} KB)", delta, delta as f64 / 1024.0);
        // Generous bound: the queue itself is ~1 MiB and fully resident already.
        assert!(delta < 4 * 1024 * 1024, "resident memory grew by {delta} bytes");
    }
}
