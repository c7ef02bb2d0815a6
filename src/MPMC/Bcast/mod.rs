#[allow(clippy::module_inception)]
pub mod Bcast;
pub mod Bcast_impl;
pub mod layout;
mod debug;
mod subscriber;

pub use Bcast::{BroadcastQueue, Buffer, BufferView}; // re-export for stable path
pub use Bcast_impl::DEFAULT_ALIGN;
pub use subscriber::Subscriber;
