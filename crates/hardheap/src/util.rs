use core::sync::atomic::{AtomicUsize, Ordering};

/// Align `value` up to the next multiple of `align`.
/// `align` must be a power of two. Returns `None` on overflow.
#[inline(always)]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Align `value` up to the next multiple of `align`.
/// `align` must be a power of two and the result must not overflow.
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Check if `value` is aligned to `align`.
#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// Default alignment for large objects (matches max_align_t on 64-bit).
pub const DEFAULT_ALIGN: usize = 16;

/// Default threshold at which `GuardedAlloc` routes a layout to the large heap.
pub const DEFAULT_LARGE_THRESHOLD: usize = 16384; // 16 KiB

/// Runtime page size, initialized from sysconf(_SC_PAGESIZE) during init.
/// Starts at 4096 so `page_size()` never returns zero.
static PAGE_SIZE_CACHED: AtomicUsize = AtomicUsize::new(4096);

/// Initialize the page size from the OS.
///
/// # Safety
/// Must be called from single-threaded context (init).
pub unsafe fn init_page_size() {
    let ps = libc::sysconf(libc::_SC_PAGESIZE);
    let ps = if ps > 0 { ps as usize } else { 4096 };
    PAGE_SIZE_CACHED.store(ps, Ordering::Release);
}

/// Get the system page size.
#[inline(always)]
pub fn page_size() -> usize {
    PAGE_SIZE_CACHED.load(Ordering::Relaxed)
}

/// splitmix64 finalizer, used to spread pointer keys across hash buckets.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(164, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(usize::MAX, 4096), None);
        assert_eq!(checked_align_up(usize::MAX - 4095, 4096), Some(usize::MAX - 4095));
        assert_eq!(checked_align_up(17, 16), Some(32));
    }

    #[test]
    fn is_aligned_checks_low_bits() {
        assert!(is_aligned(0x1000, 64));
        assert!(!is_aligned(0x1010, 64));
        assert!(is_aligned(0x1010, 16));
    }

    #[test]
    fn page_size_is_power_of_two() {
        unsafe { init_page_size() };
        assert!(page_size().is_power_of_two());
        assert!(page_size() >= 4096);
    }

    #[test]
    fn splitmix_spreads_adjacent_pages() {
        let a = splitmix64(0x7f00_0000_0000) & 0xfff;
        let b = splitmix64(0x7f00_0000_1000) & 0xfff;
        assert_ne!(a, b);
    }
}
