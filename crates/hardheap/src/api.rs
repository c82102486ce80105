//! C ABI (feature `c-api`).
//!
//! `hardheap_large_*` expose the large heap directly. `hardheap_malloc`,
//! `hardheap_free` and `hardheap_usable_size` are a minimal dispatcher that
//! sends small requests to the C library's malloc.

use crate::large::LargeHeap;
use crate::{config, hardening, init};
use core::ffi::c_void;

// ============================================================================
// Large heap
// ============================================================================

#[no_mangle]
pub extern "C" fn hardheap_large_alloc(size: usize) -> *mut c_void {
    init::heap().allocate(size) as *mut c_void
}

#[no_mangle]
pub extern "C" fn hardheap_large_memalign(alignment: usize, size: usize) -> *mut c_void {
    init::heap().allocate_aligned(alignment, size) as *mut c_void
}

/// Aborts if `ptr` is not a live large object.
#[no_mangle]
pub unsafe extern "C" fn hardheap_large_free(ptr: *mut c_void) {
    init::heap().deallocate(ptr as *mut u8);
}

#[no_mangle]
pub extern "C" fn hardheap_large_object_size(ptr: *const c_void) -> usize {
    init::heap().object_size(ptr as *const u8)
}

#[no_mangle]
pub extern "C" fn hardheap_large_is_large(ptr: *const c_void) -> libc::c_int {
    init::heap().is_large_object(ptr as *const u8) as libc::c_int
}

// ============================================================================
// Dispatcher
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn hardheap_malloc(size: usize) -> *mut c_void {
    let heap = init::heap();
    if size >= config::large_threshold() {
        heap.allocate(size) as *mut c_void
    } else {
        let p = libc::malloc(size);
        #[cfg(feature = "detect-uaf")]
        if !p.is_null() {
            heap.forget_freed(p as *const u8, size);
        }
        p
    }
}

#[no_mangle]
pub unsafe extern "C" fn hardheap_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    let heap = init::heap();
    if heap.is_large_object(ptr as *const u8) {
        heap.deallocate(ptr as *mut u8);
    } else {
        if let Some(ns) = recently_freed(heap, ptr) {
            hardening::invalid_free(ptr as *mut u8, Some(ns));
        }
        libc::free(ptr);
    }
}

#[no_mangle]
pub unsafe extern "C" fn hardheap_usable_size(ptr: *mut c_void) -> usize {
    if ptr.is_null() {
        return 0;
    }
    let heap = init::heap();
    match heap.object_size(ptr as *const u8) {
        0 => {
            if let Some(ns) = recently_freed(heap, ptr) {
                hardening::freed_size_query(ptr as *const u8, ns);
            }
            small_usable_size(ptr)
        }
        n => n,
    }
}

/// A pointer that is no longer a member but was a large object's start
/// must not reach libc, which would read a chunk header from unmapped
/// (or foreign) memory.
#[cfg(feature = "detect-uaf")]
fn recently_freed(heap: &LargeHeap, ptr: *mut c_void) -> Option<u64> {
    heap.freed_ago(ptr as *const u8)
}

#[cfg(not(feature = "detect-uaf"))]
fn recently_freed(_heap: &LargeHeap, _ptr: *mut c_void) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
unsafe fn small_usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_usable_size(ptr)
}

#[cfg(target_os = "macos")]
unsafe fn small_usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_size(ptr)
}
