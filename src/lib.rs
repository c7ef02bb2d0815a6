//! Lock-free bounded broadcast queue for shared memory.
//!
//! Any number of publishers and subscribers, in any number of processes,
//! share one fixed-size ring. Publishing never blocks: a full ring evicts its
//! oldest entry and subscribers that fell behind learn about it through their
//! drop count.
//!
//! - [`BroadcastQueue`] is the zero-copy core: `buffer_acquire` / `publish`
//!   on one side, [`Subscriber::consume_begin`] / `consume_end` on the other.
//! - [`Publisher`] / [`Receiver`] copy framed byte messages in and out.
//! - [`BcastBuilder`] places a queue in process memory or in a named,
//!   file-backed mapping other processes can join.
//! - [`Pool`] and [`WorkQueue`] are the lock-free building blocks, usable
//!   on their own.

// Module naming follows project convention (MPMC = Multi-Producer Multi-Consumer)
#[allow(non_snake_case)]
pub mod MPMC;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod error;

pub use error::{Error, Result};
pub use Core::pool::{Pool, PoolElement};
pub use Core::SharedMemory::{HeapRegion, SharedMemoryBackend, SharedRegion};
pub use MPMC::Bcast::{BroadcastQueue, Buffer, BufferView, Subscriber};
pub use MPMC::Queue::WorkQueue;
pub use MPMC::Structs::MessageMeta;
pub use MPMC::{AttachedQueue, BcastBuilder, Publisher, Received, Receiver};
