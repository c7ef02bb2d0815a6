use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::Core::SharedMemory::SharedRegion;
use crate::Core::TaggedRef::align_up;
use crate::MPMC::Bcast::{BroadcastQueue, DEFAULT_ALIGN};

/// How many times `open_or_create` retries a join that raced with the
/// creator still formatting the region.
const JOIN_RETRIES: u32 = 200;
const JOIN_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Configures a broadcast queue and places it in memory.
///
/// ```no_run
/// use lf_bcast::BcastBuilder;
///
/// let attached = BcastBuilder::new()
///     .depth(256)
///     .element_size(4096)
///     .path("/dev/shm/ticks")
///     .open_or_create()?;
/// let queue = attached.queue();
/// # Ok::<(), lf_bcast::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct BcastBuilder {
    depth: usize,
    element_size: usize,
    element_align: usize,
    path: Option<PathBuf>,
}

impl Default for BcastBuilder {
    fn default() -> Self {
        Self {
            depth: 1024,
            element_size: 1024,
            element_align: DEFAULT_ALIGN,
            path: None,
        }
    }
}

impl BcastBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ring capacity; must be a power of two.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn element_size(mut self, size: usize) -> Self {
        self.element_size = size;
        self
    }

    pub fn element_align(mut self, align: usize) -> Self {
        self.element_align = align;
        self
    }

    /// Backing file for the shared variants.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Bytes the backing file needs, rounded up to the page size.
    pub fn region_size(&self) -> Result<usize> {
        let (size, _) = BroadcastQueue::footprint(self.depth, self.element_size, self.element_align)?;
        Ok(align_up(size, page_size()))
    }

    /// A queue in process-local memory.
    pub fn build(self) -> Result<BroadcastQueue<'static>> {
        BroadcastQueue::with_align(self.depth, self.element_size, self.element_align)
    }

    /// Create the backing file (it must not exist), map it and format a queue in it.
    pub fn create_region(self) -> Result<AttachedQueue> {
        let path = self.require_path()?;
        let size = self.region_size()?;
        SharedRegion::create(&path, size)?;

        match self.attach(&path, true) {
            Ok(attached) => Ok(attached),
            Err(e) => {
                let _ = SharedRegion::remove(&path);
                Err(e)
            }
        }
    }

    /// Map an existing backing file and join the queue formatted in it.
    pub fn join_region(self) -> Result<AttachedQueue> {
        let path = self.require_path()?;
        self.attach(&path, false)
    }

    /// Create the region, or join it if the file already exists.
    ///
    /// A joiner that finds the file before the creator finished formatting
    /// it retries for about a second before giving up.
    pub fn open_or_create(self) -> Result<AttachedQueue> {
        let path = self.require_path()?;
        match self.clone().create_region() {
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {}
            other => return other,
        }

        let mut attempt = 0;
        loop {
            match self.attach(&path, false) {
                Err(Error::LayoutMismatch(_)) | Err(Error::RegionTooSmall { .. })
                    if attempt < JOIN_RETRIES =>
                {
                    attempt += 1;
                    thread::sleep(JOIN_RETRY_DELAY);
                }
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::InvalidData && attempt < JOIN_RETRIES => {
                    attempt += 1;
                    thread::sleep(JOIN_RETRY_DELAY);
                }
                other => return other,
            }
        }
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .ok_or_else(|| Error::InvalidParameters("no region path configured".into()))
    }

    fn attach(&self, path: &Path, format: bool) -> Result<AttachedQueue> {
        let region = SharedRegion::open(path)?;
        let base = BroadcastQueue::check_backend(&region, self.depth, self.element_size, self.element_align)?;

        // SAFETY: size and alignment were checked above. The mapping address
        // does not change when `region` moves, and AttachedQueue drops the
        // queue before the region.
        let queue = unsafe {
            if format {
                BroadcastQueue::mem_init(base, self.depth, self.element_size, self.element_align)?
            } else {
                BroadcastQueue::mem_join(base, self.depth, self.element_size, self.element_align)?
            }
        };
        Ok(AttachedQueue { queue, region })
    }
}

/// A broadcast queue together with the mapping it lives in.
#[derive(Debug)]
pub struct AttachedQueue {
    // Field order matters: the queue must go before the mapping.
    queue: BroadcastQueue<'static>,
    region: SharedRegion,
}

impl AttachedQueue {
    pub fn queue(&self) -> &BroadcastQueue<'_> {
        &self.queue
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Detach and unmap. The backing file stays for other processes.
    pub fn close(self) -> io::Result<()> {
        let AttachedQueue { queue, region } = self;
        queue.mem_leave();
        region.close()
    }

    /// Detach, unmap and delete the backing file. Processes still attached
    /// keep their mappings; new ones can no longer join.
    pub fn remove(self) -> io::Result<()> {
        let path = self.path().to_path_buf();
        self.close()?;
        SharedRegion::remove(path)
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        4096
    }
}

#[cfg(not(unix))]
fn page_size() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let b = BcastBuilder::default();
        assert_eq!(b.depth, 1024);
        assert_eq!(b.element_size, 1024);
        assert_eq!(b.element_align, DEFAULT_ALIGN);
        assert!(b.path.is_none());
    }

    #[test]
    fn region_size_is_page_multiple() {
        let size = BcastBuilder::new().depth(8).element_size(100).region_size().unwrap();
        assert_eq!(size % page_size(), 0);
        let (fp, _) = BroadcastQueue::footprint(8, 100, DEFAULT_ALIGN).unwrap();
        assert!(size >= fp);
    }

    #[test]
    fn shared_variants_need_a_path() {
        let err = BcastBuilder::new().depth(4).create_region().unwrap_err();
        assert!(matches!(err, Error::InvalidParameters(_)));
    }

    #[test]
    fn bad_depth_is_rejected() {
        assert!(BcastBuilder::new().depth(3).build().is_err());
        assert!(BcastBuilder::new().depth(0).region_size().is_err());
    }
}
