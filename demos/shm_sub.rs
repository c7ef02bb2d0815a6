// Receives demo messages and checks each body against its SHA-256 digest.
//
//   cargo run --example shm_sub -- [path] [--from-oldest]
use lf_bcast::{BcastBuilder, Receiver};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_PATH: &str = "/dev/shm/lf_bcast_demo";
const DEPTH: usize = 1024;
const ELEMENT_SIZE: usize = 512;
const DIGEST_LEN: usize = 32;

fn main() -> lf_bcast::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let from_oldest = args.iter().any(|a| a == "--from-oldest");
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_PATH.to_string());

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
    let mut receiver = if from_oldest {
        Receiver::from_oldest(attached.queue())
    } else {
        Receiver::new(attached.queue())
    };
    println!("Subscriber: attached to {}, Ctrl+C to stop", path);

    let mut out = vec![0u8; ELEMENT_SIZE];
    let (mut received, mut corrupt) = (0u64, 0u64);
    while running.load(Ordering::SeqCst) {
        let Some(got) = receiver.recv(&mut out, Some(Duration::from_millis(100))) else {
            continue;
        };
        if got.drops > 0 {
            println!("Subscriber: dropped {} messages", got.drops);
        }

        let frame = &out[..got.len];
        if frame.len() < DIGEST_LEN {
            corrupt += 1;
            continue;
        }
        let (body, digest) = frame.split_at(frame.len() - DIGEST_LEN);
        if Sha256::digest(body).as_slice() != digest {
            corrupt += 1;
            eprintln!("Subscriber: digest mismatch on sequence {}", got.meta.sequence);
            continue;
        }
        received += 1;
        if received % 10_000 == 0 {
            println!(
                "Subscriber: {} ok, last {:?} from pid {}",
                received,
                String::from_utf8_lossy(body),
                got.meta.sender_pid
            );
        }
    }

    println!(
        "Subscriber: {} received, {} dropped, {} corrupt",
        received,
        receiver.drops(),
        corrupt
    );
    drop(receiver);
    attached.close()?;
    Ok(())
}
