// Shared memory backings.
//
// `SharedRegion` is a file-backed MAP_SHARED mapping addressed by a path, so
// independent processes can map the same bytes. `HeapRegion` is an aligned,
// zeroed, process-local allocation used by the `new` constructors.

use std::alloc::{self, Layout};
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Memory a queue or pool can be placed into.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Base of the mapped region.
    fn as_ptr(&self) -> *mut u8;

    /// Size of the mapped region in bytes.
    fn size(&self) -> usize;

    /// OS handle behind the mapping, if any.
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor of the backing file
    Fd(i32),
    /// Process-local memory with no OS object behind it
    Anonymous,
}

/// A named, persistent shared mapping.
///
/// Lifecycle: [`SharedRegion::create`] (exclusive) -> [`SharedRegion::open`]
/// by any number of processes -> [`SharedRegion::close`] (or drop) per
/// process -> [`SharedRegion::remove`] by the owner once everyone detached.
/// Nothing here counts attachments; sequencing `remove` is the caller's job.
#[derive(Debug)]
pub struct SharedRegion {
    ptr: NonNull<u8>,
    size: usize,
    file: File,
    path: PathBuf,
    unmapped: bool,
}

// The mapping is plain bytes; all synchronization happens in what is placed there.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

#[cfg(unix)]
impl SharedRegion {
    /// Create the backing object at `path` with exactly `size` bytes.
    ///
    /// Parent directories are created as needed. Fails with
    /// `ErrorKind::AlreadyExists` if `path` exists.
    pub fn create<P: AsRef<Path>>(path: P, size: usize) -> io::Result<()> {
        use std::os::unix::fs::OpenOptionsExt;

        let path = path.as_ref();
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared region size must be non-zero",
            ));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)?;

        if let Err(e) = file.set_len(size as u64) {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e);
        }

        tracing::debug!(path = %path.display(), size, "created shared region");
        Ok(())
    }

    /// Unlink the backing object. Existing mappings stay valid until closed.
    pub fn remove<P: AsRef<Path>>(path: P) -> io::Result<()> {
        let path = path.as_ref();
        fs::remove_file(path)?;
        tracing::debug!(path = %path.display(), "removed shared region");
        Ok(())
    }

    /// Map an existing backing object read/write. The mapping covers the
    /// whole object; its size is reported by [`SharedMemoryBackend::size`].
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        use std::os::fd::AsRawFd;

        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len() as usize;
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("shared region at {} is empty", path.display()),
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;

        tracing::debug!(path = %path.display(), size, "opened shared region");
        Ok(Self {
            ptr,
            size,
            file,
            path: path.to_path_buf(),
            unmapped: false,
        })
    }

    /// Unmap this process's view. Dropping the region does the same but
    /// cannot report failure.
    pub fn close(mut self) -> io::Result<()> {
        self.unmap()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unmap(&mut self) -> io::Result<()> {
        if self.unmapped {
            return Ok(());
        }
        self.unmapped = true;
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::debug!(path = %self.path.display(), "closed shared region");
        Ok(())
    }
}

#[cfg(not(unix))]
impl SharedRegion {
    pub fn create<P: AsRef<Path>>(_path: P, _size: usize) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn remove<P: AsRef<Path>>(_path: P) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn open<P: AsRef<Path>>(_path: P) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.unmap()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unmap(&mut self) -> io::Result<()> {
        self.unmapped = true;
        Ok(())
    }
}

#[cfg(not(unix))]
fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on unix",
    )
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            tracing::warn!(path = %self.path.display(), error = %e, "munmap failed");
        }
    }
}

impl SharedMemoryBackend for SharedRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    #[cfg(unix)]
    fn raw_handle(&self) -> RawHandle {
        use std::os::fd::AsRawFd;
        RawHandle::Fd(self.file.as_raw_fd())
    }

    #[cfg(not(unix))]
    fn raw_handle(&self) -> RawHandle {
        RawHandle::Anonymous
    }
}

/// Zeroed, aligned heap memory for process-local queues and pools.
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    pub fn new(size: usize, align: usize) -> io::Result<Self> {
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("failed to allocate {} bytes aligned to {}", size, align),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl SharedMemoryBackend for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Anonymous
    }
}
