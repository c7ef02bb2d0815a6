use super::*;

/// Read-only accessors for the pool header.
///
/// Values are fixed at init except the tag counter, which is loaded with
/// relaxed ordering since it is only used for monitoring.
impl Pool<'_> {
    pub fn num_elements(&self) -> usize {
        self.header().num_elements as usize
    }

    /// Element size as requested at init.
    pub fn element_size(&self) -> usize {
        self.header().element_size as usize
    }

    pub fn element_align(&self) -> usize {
        self.header().element_align as usize
    }

    /// Distance between consecutive elements (size rounded up to alignment).
    pub fn stride(&self) -> usize {
        self.header().stride as usize
    }

    /// Number of releases performed so far.
    pub fn releases(&self) -> u64 {
        self.header().tag_next.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Whether this handle owns its memory (created with [`Pool::new`]).
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}
