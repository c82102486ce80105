#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub use macos as sys;

/// Map anonymous memory. Returns null on failure.
///
/// # Safety
/// Caller must ensure `size` is page-aligned and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Unmap previously mapped memory.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` and `size` must match.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// Nanoseconds on a monotonic clock. Only differences are meaningful.
#[inline]
pub fn monotonic_ns() -> u64 {
    sys::monotonic_ns()
}

/// Source of the page mappings that back large objects.
///
/// Mappings must be private, anonymous and read-write. Implementations
/// must be callable from any thread without external locking.
///
/// # Safety
/// `map` must return either null or the base of a fresh mapping of at least
/// `size` bytes that nothing else owns until it is passed back to `unmap`.
pub unsafe trait PageSource: Sync {
    /// Map `size` bytes (`size` is a non-zero multiple of the page size).
    /// Returns null when the request cannot be satisfied.
    fn map(&self, size: usize) -> *mut u8;

    /// Release a mapping previously returned by `map` with the same `size`.
    ///
    /// # Safety
    /// `ptr`/`size` must describe exactly one live mapping from `map`.
    unsafe fn unmap(&self, ptr: *mut u8, size: usize);
}

/// The operating system's anonymous mappings (`mmap`/`munmap`).
#[derive(Clone, Copy, Debug, Default)]
pub struct OsPages;

unsafe impl PageSource for OsPages {
    #[inline]
    fn map(&self, size: usize) -> *mut u8 {
        unsafe { map_anonymous(size) }
    }

    #[inline]
    unsafe fn unmap(&self, ptr: *mut u8, size: usize) {
        unmap(ptr, size);
    }
}
