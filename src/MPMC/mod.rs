mod builder;
mod publisher;
mod receiver;

pub use builder::{AttachedQueue, BcastBuilder};
pub use publisher::Publisher;
pub use receiver::{Received, Receiver};

pub mod Bcast;
pub mod Queue;

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{MessageMeta, FRAME_HEADER}; // re-export for stable path
}
