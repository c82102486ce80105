use crate::util::is_aligned;
use core::ptr;

/// Out-of-band bookkeeping for one live large object.
///
/// Records live in [`RecordPool`](super::pool::RecordPool) slots, which sit in
/// their own mappings, so no write through a user pointer can reach them.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct LargeRecord {
    /// Base of the mapping.
    pub actual_start: *mut u8,
    /// Pointer handed to the caller.
    pub user_start: *mut u8,
    /// Size the caller asked for.
    pub requested_size: usize,
    /// Alignment the caller asked for; `user_start` is a multiple of it.
    pub alignment: usize,
    /// Length of the mapping: `requested_size + alignment`, page-rounded.
    pub page_up_size: usize,
    /// Bytes usable from `user_start`; the requested size plus whatever
    /// alignment residual was recovered below the user pointer.
    pub usable_size: usize,
    /// Monotonic timestamp written once, on free.
    #[cfg(feature = "detect-uaf")]
    pub freed_time: u64,
}

unsafe impl Send for LargeRecord {}

impl LargeRecord {
    pub const fn empty() -> Self {
        LargeRecord {
            actual_start: ptr::null_mut(),
            user_start: ptr::null_mut(),
            requested_size: 0,
            alignment: 1,
            page_up_size: 0,
            usable_size: 0,
            #[cfg(feature = "detect-uaf")]
            freed_time: 0,
        }
    }

    /// One past the last mapped byte.
    #[inline]
    pub fn extent_end(&self) -> usize {
        self.actual_start as usize + self.page_up_size
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.alignment.is_power_of_two() && is_aligned(self.user_start as usize, self.alignment)
    }

    /// `user_start` and the usable range both sit inside the mapping.
    #[inline]
    pub fn is_within_extent(&self) -> bool {
        let actual = self.actual_start as usize;
        let user = self.user_start as usize;
        actual <= user && user < self.extent_end() && user + self.usable_size <= self.extent_end()
    }

    pub fn is_consistent(&self) -> bool {
        self.is_aligned() && self.is_within_extent() && self.usable_size >= self.requested_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(actual: usize, user: usize, requested: usize, page_up: usize) -> LargeRecord {
        LargeRecord {
            actual_start: actual as *mut u8,
            user_start: user as *mut u8,
            requested_size: requested,
            alignment: 64,
            page_up_size: page_up,
            usable_size: actual + page_up - user,
            ..LargeRecord::empty()
        }
    }

    #[test]
    fn right_aligned_record_is_consistent() {
        // allocate_aligned(64, 100) on a mapping at 0x10000
        let r = record(0x10000, 0x10000 + 3968, 100, 4096);
        assert!(r.is_consistent());
        assert_eq!(r.usable_size, 128);
        assert_eq!(r.user_start as usize + r.usable_size, r.extent_end());
    }

    #[test]
    fn misaligned_user_start_is_rejected() {
        let r = record(0x10000, 0x10000 + 3996, 100, 4096);
        assert!(!r.is_consistent());
        let r = LargeRecord { alignment: 4, ..r };
        assert!(r.is_consistent());
    }

    #[test]
    fn user_start_outside_extent_is_rejected() {
        let mut r = record(0x10000, 0x10000 + 3968, 100, 4096);
        r.user_start = 0x11000 as *mut u8;
        assert!(!r.is_within_extent());
        assert!(!r.is_consistent());
    }
}
