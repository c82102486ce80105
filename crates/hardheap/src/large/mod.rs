pub mod index;
pub mod pool;
pub mod record;

use crate::hardening::{self, self_check::IntegrityReport};
use crate::platform::{OsPages, PageSource};
use crate::sync::Mutex;
use crate::trace;
use crate::util::{checked_align_up, page_size, DEFAULT_ALIGN};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use index::AddressIndex;
use pool::RecordPool;
use record::LargeRecord;

#[cfg(feature = "detect-uaf")]
use crate::hardening::history::{FreedExtent, FreedHistory};
#[cfg(feature = "detect-uaf")]
use crate::platform;

/// Counters describing a [`LargeHeap`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LargeStats {
    /// Objects currently in the index.
    pub live_objects: usize,
    /// Bytes of mappings currently backing live objects.
    pub mapped_bytes: usize,
    pub allocations: u64,
    pub frees: u64,
}

/// Large-object heap: one private mapping per object, bookkeeping out of band.
///
/// Each allocation maps `round_up(size + alignment, page)` bytes and places
/// the user pointer as close to the end of the mapping as alignment allows,
/// so a linear overflow runs off the mapping instead of into a neighbour.
/// Records live in a [`RecordPool`] and are found through an
/// [`AddressIndex`] keyed by user pointer.
///
/// The index sits behind a single lock. It is held only across index
/// operations; mapping, unmapping and pool traffic happen outside it.
pub struct LargeHeap<P: PageSource = OsPages> {
    pages: P,
    index: Mutex<AddressIndex>,
    pool: RecordPool,
    #[cfg(feature = "detect-uaf")]
    history: FreedHistory,
    mapped_bytes: AtomicUsize,
    allocations: AtomicU64,
    frees: AtomicU64,
}

unsafe impl<P: PageSource> Send for LargeHeap<P> {}
unsafe impl<P: PageSource> Sync for LargeHeap<P> {}

impl LargeHeap<OsPages> {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self::with_pages(OsPages)
    }
}

impl<P: PageSource> LargeHeap<P> {
    pub const fn with_pages(pages: P) -> Self {
        LargeHeap {
            pages,
            index: Mutex::new(AddressIndex::new()),
            pool: RecordPool::new(),
            #[cfg(feature = "detect-uaf")]
            history: FreedHistory::new(),
            mapped_bytes: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    pub fn pages(&self) -> &P {
        &self.pages
    }

    /// Allocate `size` bytes with the default 16-byte alignment.
    #[inline]
    pub fn allocate(&self, size: usize) -> *mut u8 {
        self.allocate_aligned(DEFAULT_ALIGN, size)
    }

    /// Allocate `size` bytes at a multiple of `alignment`.
    ///
    /// Never returns null: a bad alignment, an overflowing size or an
    /// exhausted mapping aborts the process. A zero size is served as one byte.
    pub fn allocate_aligned(&self, alignment: usize, size: usize) -> *mut u8 {
        if !alignment.is_power_of_two() {
            hardening::invalid_alignment(alignment);
        }
        let size = size.max(1);

        // The extra `alignment` bytes leave room to slide the user pointer
        // down onto a boundary wherever the mapping lands.
        let page_up_size = match alignment
            .checked_add(size)
            .and_then(|n| checked_align_up(n, page_size()))
        {
            Some(n) => n,
            None => hardening::out_of_memory(size),
        };
        let slack = page_up_size - size;

        let record = self.pool.acquire();
        if record.is_null() {
            hardening::metadata_exhausted();
        }

        let actual_start = self.pages.map(page_up_size);
        if actual_start.is_null() {
            hardening::out_of_memory(page_up_size);
        }

        let candidate = actual_start as usize + slack;
        let residual = candidate & (alignment - 1);
        // slack >= alignment > residual, so the offset stays inside the mapping.
        let user_start = unsafe { actual_start.add(slack - residual) };
        let usable_size = size + residual;

        unsafe {
            record.write(LargeRecord {
                actual_start,
                user_start,
                requested_size: size,
                alignment,
                page_up_size,
                usable_size,
                #[cfg(feature = "detect-uaf")]
                freed_time: 0,
            });
        }

        #[cfg(feature = "detect-uaf")]
        self.history.forget(actual_start as usize, page_up_size);

        let inserted = self.index.lock().insert(user_start as usize, record);
        if !inserted {
            hardening::metadata_exhausted();
        }

        self.mapped_bytes.fetch_add(page_up_size, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        trace!(
            "hardheap: large alloc {:#x} (mapping {:#x}) size {} mapped {} usable {}",
            user_start as usize,
            actual_start as usize,
            size,
            page_up_size,
            usable_size
        );

        user_start
    }

    /// Unmap the large object at `ptr` and retire its record.
    ///
    /// A pointer that is not a live large object (never allocated here,
    /// interior, or already freed) aborts the process with a diagnostic.
    ///
    /// # Safety
    /// Nothing may access the object after this call.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        // Lookup and erase under one lock hold, so two racing frees of the
        // same pointer cannot both succeed.
        let erased = self.index.lock().erase(ptr as usize);
        let record = match erased {
            Some(r) => r,
            None => self.report_invalid_free(ptr),
        };

        #[cfg(feature = "detect-uaf")]
        {
            let now = platform::monotonic_ns();
            (*record).freed_time = now;
            self.history.remember(FreedExtent {
                user_start: ptr as usize,
                usable_size: (*record).usable_size,
                freed_time: now,
            });
        }

        let LargeRecord {
            actual_start,
            page_up_size,
            ..
        } = *record;

        trace!(
            "hardheap: large free {:#x} (mapping {:#x}) mapped {}",
            ptr as usize,
            actual_start as usize,
            page_up_size
        );

        self.pages.unmap(actual_start, page_up_size);
        self.pool.release(record);

        self.mapped_bytes.fetch_sub(page_up_size, Ordering::Relaxed);
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    #[cold]
    #[inline(never)]
    fn report_invalid_free(&self, ptr: *mut u8) -> ! {
        #[cfg(feature = "detect-uaf")]
        let freed_ago = self
            .history
            .lookup(ptr as usize)
            .map(|e| platform::monotonic_ns().saturating_sub(e.freed_time));
        #[cfg(not(feature = "detect-uaf"))]
        let freed_ago = None;

        hardening::invalid_free(ptr, freed_ago)
    }

    /// Bytes usable at `ptr`, or 0 if `ptr` is not a live large object.
    pub fn usable_size(&self, ptr: *const u8) -> usize {
        let index = self.index.lock();
        match index.find(ptr as usize) {
            // The record stays valid while the index lock is held: it is
            // only released after being erased.
            Some(record) => unsafe { (*record).usable_size },
            None => 0,
        }
    }

    /// Externally observable object size; the same as [`usable_size`](Self::usable_size).
    #[inline]
    pub fn object_size(&self, ptr: *const u8) -> usize {
        self.usable_size(ptr)
    }

    pub fn is_large_object(&self, ptr: *const u8) -> bool {
        self.index.lock().find(ptr as usize).is_some()
    }

    /// Snapshot of the record for a live large object.
    pub fn record(&self, ptr: *const u8) -> Option<LargeRecord> {
        let index = self.index.lock();
        index.find(ptr as usize).map(|r| unsafe { *r })
    }

    /// Nanoseconds since `ptr` was freed, if it is the start of a recently
    /// freed large object.
    #[cfg(feature = "detect-uaf")]
    pub fn freed_ago(&self, ptr: *const u8) -> Option<u64> {
        self.history
            .lookup(ptr as usize)
            .map(|e| platform::monotonic_ns().saturating_sub(e.freed_time))
    }

    /// Drop freed-object history overlapping `[ptr, ptr + len)`.
    ///
    /// For memory some other allocator handed out at an address this heap
    /// once used, so a later free of it is not mistaken for a double free.
    #[cfg(feature = "detect-uaf")]
    pub fn forget_freed(&self, ptr: *const u8, len: usize) {
        self.history.forget(ptr as usize, len.max(1));
    }

    pub fn stats(&self) -> LargeStats {
        LargeStats {
            live_objects: self.index.lock().len(),
            mapped_bytes: self.mapped_bytes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
        }
    }

    /// Walk every live record and check its layout invariants.
    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        let index = self.index.lock();
        index.for_each(|key, record| {
            let r = unsafe { *record };
            report.records_checked += 1;
            if key != r.user_start as usize {
                report.key_mismatch += 1;
            }
            if !r.is_aligned() {
                report.misaligned += 1;
            }
            if !r.is_within_extent() {
                report.out_of_extent += 1;
            }
            if r.usable_size < r.requested_size {
                report.undersized += 1;
            }
        });
        report
    }

    /// Reset every lock owned by the heap.
    ///
    /// # Safety
    /// Only safe in the single-threaded child right after `fork()`.
    pub unsafe fn reset_locks_after_fork(&self) {
        self.index.force_unlock();
        self.pool.reset_lock();
        #[cfg(feature = "detect-uaf")]
        self.history.reset_lock();
    }
}
