use super::record::LargeRecord;
use crate::platform;
use crate::sync::Mutex;
use core::mem::{align_of, size_of};
use core::ptr;

/// Bytes per pool chunk mapping.
const CHUNK_SIZE: usize = 64 * 1024;

/// A freed slot, threaded onto the free list through its first word.
struct FreeSlot {
    next: *mut FreeSlot,
}

/// Header at the start of every chunk, linking the chunks for teardown.
struct ChunkHeader {
    next: *mut ChunkHeader,
}

const SLOT_SIZE: usize = {
    let s = size_of::<LargeRecord>();
    let a = align_of::<LargeRecord>();
    (s + a - 1) & !(a - 1)
};
const HEADER_SIZE: usize = (size_of::<ChunkHeader>() + SLOT_SIZE - 1) / SLOT_SIZE * SLOT_SIZE;

const _: () = assert!(SLOT_SIZE >= size_of::<FreeSlot>());
const _: () = assert!(align_of::<LargeRecord>() >= align_of::<FreeSlot>());

struct PoolInner {
    free: *mut FreeSlot,
    bump: usize,
    bump_end: usize,
    chunks: *mut ChunkHeader,
    chunk_count: usize,
    live: usize,
}

/// Fixed-size allocator for [`LargeRecord`]s.
///
/// Slots come from anonymous chunk mappings that are never handed to a
/// caller, so records stay out of reach of user-data overflows. Chunks are
/// kept for the pool's lifetime; freed slots are reused LIFO.
pub struct RecordPool {
    inner: Mutex<PoolInner>,
}

unsafe impl Send for PoolInner {}

impl RecordPool {
    pub const fn new() -> Self {
        RecordPool {
            inner: Mutex::new(PoolInner {
                free: ptr::null_mut(),
                bump: 0,
                bump_end: 0,
                chunks: ptr::null_mut(),
                chunk_count: 0,
                live: 0,
            }),
        }
    }

    /// Storage for one record, uninitialized. Null when no chunk could be mapped.
    pub fn acquire(&self) -> *mut LargeRecord {
        let mut inner = self.inner.lock();

        if !inner.free.is_null() {
            let slot = inner.free;
            inner.free = unsafe { (*slot).next };
            inner.live += 1;
            return slot as *mut LargeRecord;
        }

        if inner.bump + SLOT_SIZE > inner.bump_end && !Self::add_chunk(&mut inner) {
            return ptr::null_mut();
        }
        let slot = inner.bump as *mut LargeRecord;
        inner.bump += SLOT_SIZE;
        inner.live += 1;
        slot
    }

    /// Return a slot obtained from [`acquire`](Self::acquire).
    ///
    /// # Safety
    /// `record` must come from this pool and must not be used afterwards.
    pub unsafe fn release(&self, record: *mut LargeRecord) {
        debug_assert!(!record.is_null());
        let mut inner = self.inner.lock();
        let slot = record as *mut FreeSlot;
        (*slot).next = inner.free;
        inner.free = slot;
        inner.live -= 1;
    }

    /// Records currently handed out.
    pub fn live(&self) -> usize {
        self.inner.lock().live
    }

    /// Chunk mappings owned by the pool.
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().chunk_count
    }

    /// Slots carved from one chunk.
    pub const fn slots_per_chunk() -> usize {
        (CHUNK_SIZE - HEADER_SIZE) / SLOT_SIZE
    }

    /// # Safety
    /// Post-fork child only.
    pub unsafe fn reset_lock(&self) {
        self.inner.force_unlock();
    }

    fn add_chunk(inner: &mut PoolInner) -> bool {
        let base = unsafe { platform::map_anonymous(CHUNK_SIZE) };
        if base.is_null() {
            return false;
        }
        let header = base as *mut ChunkHeader;
        unsafe {
            (*header).next = inner.chunks;
        }
        inner.chunks = header;
        inner.chunk_count += 1;
        inner.bump = base as usize + HEADER_SIZE;
        inner.bump_end = base as usize + CHUNK_SIZE;
        true
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecordPool {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        let mut chunk = inner.chunks;
        while !chunk.is_null() {
            unsafe {
                let next = (*chunk).next;
                platform::unmap(chunk as *mut u8, CHUNK_SIZE);
                chunk = next;
            }
        }
    }
}
