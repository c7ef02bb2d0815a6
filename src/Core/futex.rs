// Kernel-assisted wait/wake on a 32-bit word.
//
// The word lives in shared memory, so the calls are never FUTEX_PRIVATE:
// waiters and wakers may be in different processes.

use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Address of the low 32 bits of a 64-bit counter.
///
/// Linux only supports 32-bit futexes, so waiters key on the low half of the
/// tail index. A wrap of the low half between a waiter's load and its
/// syscall only costs a spurious sleep bounded by the caller's timeout.
#[inline]
pub fn low_word(counter: &AtomicU64) -> *const u32 {
    let base = counter as *const AtomicU64 as *const u32;
    if cfg!(target_endian = "little") {
        base
    } else {
        // SAFETY: AtomicU64 is 8 bytes; the second u32 is in bounds.
        unsafe { base.add(1) }
    }
}

/// Sleep while `*addr == expected`, at most `timeout` (`None` = forever).
///
/// Returns normally on wake, value mismatch, timeout or signal; callers
/// re-check their condition in every case.
#[cfg(target_os = "linux")]
pub fn futex_wait(addr: *const u32, expected: u32, timeout: Option<Duration>) {
    use std::ptr;

    let timespec = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let timespec_ptr = match &timespec {
        Some(ts) => ts as *const libc::timespec,
        None => ptr::null(),
    };

    let result = unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr,
            libc::FUTEX_WAIT,
            expected,
            timespec_ptr,
            ptr::null::<u32>(),
            0u32,
        )
    };

    if result != 0 {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) | Some(libc::EINTR) => {}
            _ => tracing::warn!(error = %err, "futex wait failed"),
        }
    }
}

/// Wake every waiter sleeping on `addr`.
#[cfg(target_os = "linux")]
pub fn futex_wake_all(addr: *const u32) {
    let result = unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr,
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        )
    };
    if result < 0 {
        tracing::warn!(error = %std::io::Error::last_os_error(), "futex wake failed");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wait(addr: *const u32, expected: u32, timeout: Option<Duration>) {
    // No cross-process wait primitive here: nap briefly and let the caller re-check.
    let nap = Duration::from_micros(50);
    let current = unsafe { std::ptr::read_volatile(addr) };
    if current == expected {
        std::thread::sleep(timeout.map_or(nap, |t| t.min(nap)));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_addr: *const u32) {
    // Waiters poll on this platform.
}
