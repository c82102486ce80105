use crate::util::DEFAULT_LARGE_THRESHOLD;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Cached config values (read once at init, never allocate).
static LARGE_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_LARGE_THRESHOLD);

/// Read configuration from environment variables.
/// Must be called during init, before any allocations.
///
/// # Safety
/// Must be called from single-threaded context (init).
pub unsafe fn read_config() {
    if let Some(val) = getenv_usize(b"HARDHEAP_LARGE_THRESHOLD\0") {
        // A zero threshold would send zero-sized layouts to the large heap.
        LARGE_THRESHOLD.store(val.max(1), Ordering::Relaxed);
    }
    crate::trace::set_enabled(getenv_present(b"HARDHEAP_TRACE\0"));
}

/// Smallest layout size that `GuardedAlloc` routes to the large heap.
pub fn large_threshold() -> usize {
    LARGE_THRESHOLD.load(Ordering::Relaxed)
}

/// # Safety
/// Calls libc::getenv; `key` must be NUL-terminated.
unsafe fn getenv_present(key: &[u8]) -> bool {
    !libc::getenv(key.as_ptr() as *const libc::c_char).is_null()
}

/// Parse an environment variable as a usize.
///
/// # Safety
/// Calls libc::getenv; `key` must be NUL-terminated.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let val = libc::getenv(key.as_ptr() as *const libc::c_char);
    if val.is_null() {
        return None;
    }
    parse_usize(core::ffi::CStr::from_ptr(val).to_bytes())
}

/// Decimal digits only; rejects empty input, signs and overflow.
fn parse_usize(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    let mut result: usize = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
    }
    Some(result)
}
