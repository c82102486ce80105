//! `#[global_allocator]` support.
//!
//! Routes every layout at or above the large-object threshold
//! (`HARDHEAP_LARGE_THRESHOLD`, 16 KiB by default) to the process-wide
//! large heap and everything smaller to an inner allocator:
//!
//! ```rust,ignore
//! use hardheap::GuardedAlloc;
//!
//! #[global_allocator]
//! static GLOBAL: GuardedAlloc = GuardedAlloc::new();
//! ```

use crate::{config, init};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use std::alloc::System;

/// Dispatcher between the large heap and a small-object allocator `A`.
pub struct GuardedAlloc<A = System> {
    small: A,
}

impl GuardedAlloc<System> {
    pub const fn new() -> Self {
        GuardedAlloc { small: System }
    }
}

impl Default for GuardedAlloc<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> GuardedAlloc<A> {
    pub const fn with_small(small: A) -> Self {
        GuardedAlloc { small }
    }

    /// Whether a layout of `size` bytes is served by the large heap.
    /// The threshold is fixed once the library is initialized, so an
    /// allocation and its matching free always agree.
    #[inline]
    pub fn is_large_size(size: usize) -> bool {
        size >= config::large_threshold()
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for GuardedAlloc<A> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let heap = init::heap();
        if Self::is_large_size(layout.size()) {
            heap.allocate_aligned(layout.align(), layout.size())
        } else {
            self.small.alloc(layout)
        }
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let heap = init::heap();
        if Self::is_large_size(layout.size()) {
            // Fresh anonymous mappings are already zero-filled.
            heap.allocate_aligned(layout.align(), layout.size())
        } else {
            self.small.alloc_zeroed(layout)
        }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if Self::is_large_size(layout.size()) {
            // Aborts if `ptr` is not a live large object.
            init::heap().deallocate(ptr);
        } else {
            self.small.dealloc(ptr, layout);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let old_large = Self::is_large_size(layout.size());
        let new_large = Self::is_large_size(new_size);

        if !old_large && !new_large {
            return self.small.realloc(ptr, layout, new_size);
        }

        let heap = init::heap();
        if old_large && new_large && new_size <= heap.usable_size(ptr) {
            // Still fits in the existing mapping.
            return ptr;
        }

        let new_layout = Layout::from_size_align_unchecked(new_size, layout.align());
        let new_ptr = self.alloc(new_layout);
        if !new_ptr.is_null() {
            ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
            self.dealloc(ptr, layout);
        }
        new_ptr
    }
}
