// Publishes numbered messages, each carrying a SHA-256 digest of its body.
//
//   cargo run --example shm_pub -- <num_messages> [path]
use lf_bcast::{BcastBuilder, Publisher};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const DEFAULT_PATH: &str = "/dev/shm/lf_bcast_demo";
const DEPTH: usize = 1024;
const ELEMENT_SIZE: usize = 512;

fn main() -> lf_bcast::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [path]", args[0]);
        std::process::exit(1);
    }
    let num_messages: u64 = args[1].parse().expect("Invalid number of messages");
    let path = args.get(2).cloned().unwrap_or_else(|| DEFAULT_PATH.to_string());

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let attached = BcastBuilder::new()
        .depth(DEPTH)
        .element_size(ELEMENT_SIZE)
        .path(&path)
        .open_or_create()?;
    let publisher = Publisher::new(attached.queue());
    println!("Publisher: attached to {}, sending {} messages", path, num_messages);

    let start = Instant::now();
    let mut sent = 0u64;
    for i in 0..num_messages {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let body = format!("message_{}", i);
        let digest = Sha256::digest(body.as_bytes());
        let mut frame = Vec::with_capacity(body.len() + digest.len());
        frame.extend_from_slice(body.as_bytes());
        frame.extend_from_slice(&digest);
        publisher.send(&frame)?;
        sent += 1;
    }

    let elapsed = start.elapsed();
    println!(
        "Publisher: sent {} messages in {:.2?} ({:.0} msg/s)",
        sent,
        elapsed,
        sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    drop(publisher);
    attached.close()?;
    Ok(())
}
