pub mod SharedMemory;
pub mod TaggedRef;
pub mod futex;
pub mod pool;

pub use SharedMemory::{HeapRegion, RawHandle, SharedMemoryBackend, SharedRegion};
pub use TaggedRef::RefValue;
