use super::record::LargeRecord;
use crate::platform;
use crate::util::{align_up, page_size, splitmix64};
use core::mem::size_of;
use core::ptr;

#[derive(Clone, Copy)]
#[repr(C)]
struct IndexSlot {
    /// User address (0 = empty slot).
    key: usize,
    record: *mut LargeRecord,
}

/// Address-keyed map from a live large object's user pointer to its record.
///
/// Open addressing with linear probing and backward-shift deletion. The slot
/// array is an anonymous mapping of its own and doubles at 75% load.
///
/// Not synchronized: the owning heap keeps it behind its guard.
pub struct AddressIndex {
    slots: *mut IndexSlot,
    capacity: usize,
    len: usize,
    mapped_size: usize,
}

unsafe impl Send for AddressIndex {}

impl AddressIndex {
    const INITIAL_CAPACITY: usize = 1024;

    /// An index with no storage; the first insert maps it.
    pub const fn new() -> Self {
        AddressIndex {
            slots: ptr::null_mut(),
            capacity: 0,
            len: 0,
            mapped_size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn bucket(key: usize, mask: usize) -> usize {
        splitmix64(key as u64) as usize & mask
    }

    pub fn find(&self, addr: usize) -> Option<*mut LargeRecord> {
        if self.capacity == 0 || addr == 0 {
            return None;
        }
        let mask = self.capacity - 1;
        let mut idx = Self::bucket(addr, mask);
        loop {
            let slot = unsafe { *self.slots.add(idx) };
            if slot.key == addr {
                return Some(slot.record);
            }
            if slot.key == 0 {
                return None;
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Publish `record` under `addr`. The address must not already be
    /// present. Returns false only if the slot array could not be mapped
    /// or grown.
    pub fn insert(&mut self, addr: usize, record: *mut LargeRecord) -> bool {
        debug_assert!(addr != 0);
        debug_assert!(self.find(addr).is_none(), "address published twice");

        if self.capacity == 0 && !self.resize(Self::INITIAL_CAPACITY) {
            return false;
        }
        if (self.len + 1) * 4 > self.capacity * 3
            && !self.resize(self.capacity * 2)
            && self.len + 1 >= self.capacity
        {
            return false;
        }

        let mask = self.capacity - 1;
        let mut idx = Self::bucket(addr, mask);
        loop {
            let slot = unsafe { &mut *self.slots.add(idx) };
            if slot.key == 0 {
                slot.key = addr;
                slot.record = record;
                self.len += 1;
                return true;
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Remove `addr` and hand back its record.
    pub fn erase(&mut self, addr: usize) -> Option<*mut LargeRecord> {
        if self.capacity == 0 || addr == 0 {
            return None;
        }
        let mask = self.capacity - 1;
        let mut idx = Self::bucket(addr, mask);
        loop {
            let slot = unsafe { *self.slots.add(idx) };
            if slot.key == addr {
                self.remove_at(idx);
                return Some(slot.record);
            }
            if slot.key == 0 {
                return None;
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Visit every (address, record) pair in slot order.
    pub fn for_each<F: FnMut(usize, *mut LargeRecord)>(&self, mut f: F) {
        for i in 0..self.capacity {
            let slot = unsafe { *self.slots.add(i) };
            if slot.key != 0 {
                f(slot.key, slot.record);
            }
        }
    }

    /// Empty slot `idx` and shift later members of its probe run back so
    /// lookups never stop early at the hole.
    fn remove_at(&mut self, idx: usize) {
        let mask = self.capacity - 1;
        let mut vacancy = idx;
        unsafe {
            (*self.slots.add(vacancy)).key = 0;
        }
        self.len -= 1;

        let mut next = (idx + 1) & mask;
        loop {
            let slot = unsafe { *self.slots.add(next) };
            if slot.key == 0 {
                break;
            }
            let ideal = Self::bucket(slot.key, mask);
            let should_move = if next > vacancy {
                ideal <= vacancy || ideal > next
            } else {
                ideal <= vacancy && ideal > next
            };
            if should_move {
                unsafe {
                    *self.slots.add(vacancy) = slot;
                    (*self.slots.add(next)).key = 0;
                }
                vacancy = next;
            }
            next = (next + 1) & mask;
        }
    }

    /// Move every entry into a fresh slot array of `new_capacity`.
    fn resize(&mut self, new_capacity: usize) -> bool {
        debug_assert!(new_capacity.is_power_of_two());
        let new_size = align_up(new_capacity * size_of::<IndexSlot>(), page_size());
        // Fresh anonymous pages are zero-filled: every slot starts empty.
        let new_slots = unsafe { platform::map_anonymous(new_size) } as *mut IndexSlot;
        if new_slots.is_null() {
            return false;
        }

        let mask = new_capacity - 1;
        for i in 0..self.capacity {
            let slot = unsafe { *self.slots.add(i) };
            if slot.key == 0 {
                continue;
            }
            let mut idx = Self::bucket(slot.key, mask);
            unsafe {
                while (*new_slots.add(idx)).key != 0 {
                    idx = (idx + 1) & mask;
                }
                *new_slots.add(idx) = slot;
            }
        }

        if !self.slots.is_null() {
            unsafe { platform::unmap(self.slots as *mut u8, self.mapped_size) };
        }
        self.slots = new_slots;
        self.capacity = new_capacity;
        self.mapped_size = new_size;
        true
    }
}

impl Default for AddressIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AddressIndex {
    fn drop(&mut self) {
        if !self.slots.is_null() {
            unsafe { platform::unmap(self.slots as *mut u8, self.mapped_size) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(n: usize) -> *mut LargeRecord {
        (n * 8) as *mut LargeRecord
    }

    #[test]
    fn empty_index_finds_nothing() {
        let index = AddressIndex::new();
        assert!(index.find(0x1000).is_none());
        assert!(index.is_empty());
        assert_eq!(index.capacity(), 0);
    }

    #[test]
    fn insert_find_erase() {
        let mut index = AddressIndex::new();
        assert!(index.insert(0x7000_1000, fake(1)));
        assert!(index.insert(0x7000_2000, fake(2)));
        assert_eq!(index.len(), 2);
        assert_eq!(index.find(0x7000_1000), Some(fake(1)));
        assert_eq!(index.find(0x7000_2000), Some(fake(2)));
        assert_eq!(index.find(0x7000_3000), None);

        assert_eq!(index.erase(0x7000_1000), Some(fake(1)));
        assert_eq!(index.find(0x7000_1000), None);
        assert_eq!(index.erase(0x7000_1000), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn null_address_is_never_a_member() {
        let mut index = AddressIndex::new();
        assert!(index.insert(0x4000, fake(1)));
        assert!(index.find(0).is_none());
        assert!(index.erase(0).is_none());
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut index = AddressIndex::new();
        let n = AddressIndex::INITIAL_CAPACITY * 3;
        for i in 1..=n {
            assert!(index.insert(i * 0x1000, fake(i)));
        }
        assert_eq!(index.len(), n);
        assert!(index.capacity() * 3 >= n * 4);
        for i in 1..=n {
            assert_eq!(index.find(i * 0x1000), Some(fake(i)));
        }
    }

    #[test]
    fn erase_keeps_probe_runs_reachable() {
        let mut index = AddressIndex::new();
        let n = 700;
        for i in 1..=n {
            assert!(index.insert(i * 0x40, fake(i)));
        }
        // Drop every third entry, then make sure the rest still resolve.
        for i in (1..=n).step_by(3) {
            assert_eq!(index.erase(i * 0x40), Some(fake(i)));
        }
        for i in 1..=n {
            let expected = if (i - 1) % 3 == 0 { None } else { Some(fake(i)) };
            assert_eq!(index.find(i * 0x40), expected, "key {:#x}", i * 0x40);
        }
    }

    #[test]
    fn for_each_visits_all_members() {
        let mut index = AddressIndex::new();
        for i in 1..=50 {
            index.insert(i * 0x2000, fake(i));
        }
        let mut sum = 0;
        let mut count = 0;
        index.for_each(|key, rec| {
            assert_eq!(rec, fake(key / 0x2000));
            sum += key / 0x2000;
            count += 1;
        });
        assert_eq!(count, 50);
        assert_eq!(sum, 50 * 51 / 2);
    }
}
