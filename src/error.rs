//! Error type for construction, placement and the copying API.
//!
//! Hot paths (publish, consume) never produce errors: contention is retried
//! internally and overruns are reported as drops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O errors from the shared region layer
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected construction parameters (depth, element size, alignment)
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A join found a region formatted with different parameters
    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Region too small: required {required} bytes, got {actual}")]
    RegionTooSmall { required: usize, actual: usize },

    #[error("Region base is not aligned to {align} bytes")]
    Misaligned { align: usize },

    #[error("Message too large ({len} > {max})")]
    MessageTooLarge { len: usize, max: usize },

    /// No buffer could be acquired, from the pool or by evicting the head
    #[error("No buffer available")]
    Exhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
