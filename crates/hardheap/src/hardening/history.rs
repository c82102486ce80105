use crate::sync::Mutex;

const HISTORY_SLOTS: usize = 256;

/// A large object that has already been unmapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreedExtent {
    pub user_start: usize,
    pub usable_size: usize,
    pub freed_time: u64,
}

impl FreedExtent {
    const EMPTY: FreedExtent = FreedExtent {
        user_start: 0,
        usable_size: 0,
        freed_time: 0,
    };

    fn end(&self) -> usize {
        self.user_start + self.usable_size.max(1)
    }

    fn is_start(&self, addr: usize) -> bool {
        self.user_start != 0 && self.user_start == addr
    }
}

struct HistoryInner {
    entries: [FreedExtent; HISTORY_SLOTS],
    next: usize,
}

/// Ring of the most recently freed large objects.
///
/// Only consulted when a free does not match a live object, to tell a double
/// free apart from a wild pointer in the diagnostic. Reuse is never delayed.
pub struct FreedHistory {
    inner: Mutex<HistoryInner>,
}

impl FreedHistory {
    pub const fn new() -> Self {
        FreedHistory {
            inner: Mutex::new(HistoryInner {
                entries: [FreedExtent::EMPTY; HISTORY_SLOTS],
                next: 0,
            }),
        }
    }

    pub fn remember(&self, extent: FreedExtent) {
        let mut inner = self.inner.lock();
        let slot = inner.next;
        inner.entries[slot] = extent;
        inner.next = (slot + 1) % HISTORY_SLOTS;
    }

    /// Most recent freed extent that started at `addr`, if still remembered.
    /// Interior addresses never match: freeing one is an invalid free, not a
    /// double free.
    pub fn lookup(&self, addr: usize) -> Option<FreedExtent> {
        let inner = self.inner.lock();
        (0..HISTORY_SLOTS)
            .map(|back| inner.entries[(inner.next + HISTORY_SLOTS - 1 - back) % HISTORY_SLOTS])
            .find(|e| e.is_start(addr))
    }

    /// Drop an extent once its address range has been mapped again.
    pub fn forget(&self, user_start: usize, len: usize) {
        let mut inner = self.inner.lock();
        let end = user_start.saturating_add(len);
        for e in inner.entries.iter_mut() {
            if e.user_start != 0 && e.user_start < end && user_start < e.end() {
                *e = FreedExtent::EMPTY;
            }
        }
    }

    /// # Safety
    /// Post-fork child only.
    pub unsafe fn reset_lock(&self) {
        self.inner.force_unlock();
    }
}

impl Default for FreedHistory {
    fn default() -> Self {
        Self::new()
    }
}
