// Formats (or removes) the named region the shm_pub / shm_sub demos share.
//
//   cargo run --example shm_create -- [path] [--remove]
use lf_bcast::BcastBuilder;
use std::env;
use tracing_subscriber::EnvFilter;

const DEFAULT_PATH: &str = "/dev/shm/lf_bcast_demo";
const DEPTH: usize = 1024;
const ELEMENT_SIZE: usize = 512;

fn main() -> lf_bcast::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let remove = args.iter().any(|a| a == "--remove");
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_PATH.to_string());

    let builder = BcastBuilder::new()
        .depth(DEPTH)
        .element_size(ELEMENT_SIZE)
        .path(&path);

    if remove {
        lf_bcast::SharedRegion::remove(&path)?;
        println!("Removed {}", path);
        return Ok(());
    }

    let attached = builder.clone().create_region()?;
    println!(
        "Created {} ({} bytes): depth {}, element size {}",
        path,
        builder.region_size()?,
        attached.queue().depth(),
        attached.queue().element_size()
    );
    attached.close()?;
    Ok(())
}
