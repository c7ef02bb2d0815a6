use lf_bcast::{BroadcastQueue, BufferView, Error};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Option<Duration> = Some(Duration::ZERO);

fn publish_u64(q: &BroadcastQueue<'_>, v: u64) {
    let mut buf = q.buffer_acquire().expect("buffer");
    buf.write(&v.to_le_bytes()).unwrap();
    q.publish(buf);
}

fn read_u64(view: &BufferView<'_>) -> u64 {
    let mut b = [0u8; 8];
    assert_eq!(view.read_into(&mut b), 8);
    u64::from_le_bytes(b)
}

#[test]
fn test_rejects_bad_parameters() {
    assert!(matches!(BroadcastQueue::new(3, 8), Err(Error::InvalidParameters(_))));
    assert!(matches!(BroadcastQueue::new(0, 8), Err(Error::InvalidParameters(_))));
    assert!(matches!(BroadcastQueue::new(4, 0), Err(Error::InvalidParameters(_))));
    assert!(BroadcastQueue::with_align(4, 8, 3).is_err());
    assert!(BroadcastQueue::new(1, 8).is_ok());
}

#[test]
fn test_depth_two_eviction_scenario() {
    let q = BroadcastQueue::new(2, 8).unwrap();
    let mut first = q.subscribe();
    // Stays idle while the ring turns over.
    let mut stale = q.subscribe();

    publish_u64(&q, 2);
    publish_u64(&q, 3);

    let v = first.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 2);
    assert!(first.consume_end());
    let v = first.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 3);
    assert!(first.consume_end());
    assert_eq!(first.drops(), 0);

    // Ring now holds {3, 4}.
    publish_u64(&q, 4);
    assert_eq!(q.head_index(), 2);
    assert_eq!(q.tail_index(), 4);

    let v = stale.consume_begin(POLL).unwrap();
    assert_eq!(stale.drops(), 1);
    assert_eq!(read_u64(&v), 3);
    assert!(stale.consume_end());
    let v = stale.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 4);
    assert!(stale.consume_end());
    assert_eq!(stale.drops(), 1);

    let v = first.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 4);
    assert!(first.consume_end());
    assert_eq!(first.drops(), 0);
}

#[test]
fn test_subscriber_starts_at_tail() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    publish_u64(&q, 1);
    publish_u64(&q, 2);

    let mut late = q.subscribe();
    assert!(late.consume_begin(POLL).is_none(), "nothing before attach time");

    let mut oldest = q.subscribe_from_oldest();
    let v = oldest.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 1);
    assert!(oldest.consume_end());

    publish_u64(&q, 3);
    let v = late.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 3);
    assert!(late.consume_end());
    assert_eq!(late.drops(), 0);
}

#[test]
fn test_drain_within_depth_has_no_drops() {
    let depth = 16;
    let q = BroadcastQueue::new(depth, 8).unwrap();
    let mut sub = q.subscribe();

    for round in 0..5u64 {
        for i in 0..depth as u64 {
            publish_u64(&q, round * 1000 + i);
        }
        for i in 0..depth as u64 {
            let v = sub.consume_begin(POLL).expect("entry");
            assert_eq!(read_u64(&v), round * 1000 + i);
            assert!(sub.consume_end());
        }
        assert!(sub.consume_begin(POLL).is_none());
    }
    assert_eq!(sub.drops(), 0);
    assert_eq!(q.len(), depth);
}

#[test]
fn test_two_subscribers_see_identical_sequences() {
    let q = BroadcastQueue::new(8, 32).unwrap();
    let mut a = q.subscribe();
    let mut b = q.subscribe();

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for i in 0..40u64 {
        let mut buf = q.buffer_acquire().unwrap();
        let payload = [i as u8; 32];
        buf.write(&payload).unwrap();
        q.publish(buf);

        if i % 3 == 2 {
            for (sub, seen) in [(&mut a, &mut seen_a), (&mut b, &mut seen_b)] {
                while let Some(v) = sub.consume_begin(POLL) {
                    let mut out = [0u8; 32];
                    v.read_into(&mut out);
                    if sub.consume_end() {
                        seen.push(out);
                    }
                }
            }
        }
    }
    assert_eq!(seen_a, seen_b);
    assert_eq!(a.drops(), b.drops());
    assert_eq!(a.drops(), 0);
}

#[test]
fn test_order_preserved_with_drops() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let mut sub = q.subscribe();
    let total = 100u64;

    let mut seen = Vec::new();
    for i in 0..total {
        publish_u64(&q, i);
        // Read one entry every fifth publish, so the ring overruns.
        if i % 5 == 4 {
            if let Some(v) = sub.consume_begin(POLL) {
                let x = read_u64(&v);
                if sub.consume_end() {
                    seen.push(x);
                }
            }
        }
    }
    while let Some(v) = sub.consume_begin(POLL) {
        let x = read_u64(&v);
        if sub.consume_end() {
            seen.push(x);
        }
    }

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", seen);
    assert_eq!(seen.len() as u64 + sub.drops(), total);
    assert_eq!(*seen.last().unwrap(), total - 1);
}

#[test]
fn test_acquire_release_leaves_pool_unchanged() {
    let q = BroadcastQueue::new(8, 64).unwrap();
    let before = q.pool().free_count();
    let buf = q.buffer_acquire().unwrap();
    assert_eq!(q.pool().free_count(), before - 1);
    q.buffer_release(buf);
    assert_eq!(q.pool().free_count(), before);

    // Dropping is the same as releasing.
    drop(q.buffer_acquire().unwrap());
    assert_eq!(q.pool().free_count(), before);
}

#[test]
fn test_buffer_write_rejects_oversized() {
    let q = BroadcastQueue::new(2, 8).unwrap();
    let mut buf = q.buffer_acquire().unwrap();
    buf.write(&[7u8; 8]).unwrap();
    assert!(matches!(
        buf.write(&[1u8; 9]),
        Err(Error::MessageTooLarge { len: 9, max: 8 })
    ));
    // The failed write leaves the earlier contents in place.
    assert_eq!(buf.as_slice(), &[7u8; 8]);
    q.buffer_release(buf);
}

#[test]
fn test_acquire_exhaustion_and_eviction_fallback() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let mut held: Vec<_> = (0..4).map(|_| q.buffer_acquire().unwrap()).collect();
    assert!(q.buffer_acquire().is_none(), "pool empty and nothing to evict");

    // A release makes one available again.
    q.buffer_release(held.pop().unwrap());
    held.push(q.buffer_acquire().unwrap());

    for (i, mut buf) in held.into_iter().enumerate() {
        buf.write(&(i as u64).to_le_bytes()).unwrap();
        q.publish(buf);
    }
    assert_eq!(q.pool().free_count(), 0);
    assert_eq!(q.len(), 4);

    // Pool empty, ring full: acquiring evicts the oldest entry.
    let head = q.head_index();
    let buf = q.buffer_acquire().expect("evicted head");
    assert_eq!(q.head_index(), head + 1);
    q.publish(buf);
    assert_eq!(q.len(), 4);
}

#[test]
fn test_consume_end_reports_eviction_during_read() {
    let q = BroadcastQueue::new(2, 8).unwrap();
    let mut sub = q.subscribe();

    publish_u64(&q, 10);
    let v = sub.consume_begin(POLL).unwrap();
    assert!(sub.is_active());
    assert_eq!(read_u64(&v), 10);

    // Overrun the ring while the read is in flight.
    publish_u64(&q, 11);
    publish_u64(&q, 12);

    assert!(!sub.consume_end(), "entry was evicted mid-read");
    assert!(!sub.is_active());
    assert_eq!(sub.drops(), 1);

    let v = sub.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 11);
    assert!(sub.consume_end());
    let v = sub.consume_begin(POLL).unwrap();
    assert_eq!(read_u64(&v), 12);
    assert!(sub.consume_end());
    assert_eq!(sub.drops(), 1);
}

#[test]
fn test_begin_reattaches_at_tail() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let mut sub = q.subscribe();
    publish_u64(&q, 1);
    publish_u64(&q, 2);
    sub.begin();
    assert_eq!(sub.next_index(), q.tail_index());
    assert!(sub.consume_begin(POLL).is_none());
}

#[test]
fn test_timeout_semantics() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let mut sub = q.subscribe();

    let start = Instant::now();
    assert!(sub.consume_begin(POLL).is_none());
    assert!(start.elapsed() < Duration::from_millis(50));

    let start = Instant::now();
    assert!(sub.consume_begin(Some(Duration::from_millis(30))).is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_blocking_consumer_is_woken_by_publish() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let mut sub = q.subscribe();

    thread::scope(|s| {
        let reader = s.spawn(move || {
            let v = sub.consume_begin(None).expect("blocking wait returns data");
            let x = read_u64(&v);
            assert!(sub.consume_end());
            x
        });
        thread::sleep(Duration::from_millis(50));
        publish_u64(&q, 77);
        assert_eq!(reader.join().unwrap(), 77);
    });
}

#[test]
fn test_element_alignment_respected() {
    let q = BroadcastQueue::with_align(4, 100, 64).unwrap();
    assert_eq!(q.element_align(), 64);
    for _ in 0..8 {
        let buf = q.buffer_acquire().unwrap();
        assert_eq!(buf.as_ptr() as usize % 64, 0);
        assert_eq!(buf.len(), 100);
        q.publish(buf);
    }
}

#[test]
fn test_debug_output() {
    let q = BroadcastQueue::new(4, 8).unwrap();
    let sub = q.subscribe();
    let text = format!("{:?} {:?}", q, sub);
    println!("{}", text);
    assert!(text.contains("BroadcastQueue"));
    assert!(text.contains("depth: 4"));
    assert!(text.contains("Subscriber"));
}
