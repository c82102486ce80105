#![no_main]

use hardheap::{util, LargeHeap};
use libfuzzer_sys::fuzz_target;

// Exercises the alignment-slack arithmetic.
// Interprets input as a series of (size, alignment_shift) records,
// allocates, checks the layout invariants, writes the full usable
// range and frees.

fuzz_target!(|data: &[u8]| {
    let heap = LargeHeap::new();
    let mut i = 0;
    while i + 5 <= data.len() {
        let raw_size = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let align = 1usize << (data[i + 4] % 21);
        i += 5;

        // Cap size to prevent OOM
        let size = (raw_size as usize) % (4 * 1024 * 1024);

        let p = heap.allocate_aligned(align, size);
        let r = heap.record(p).expect("fresh allocation is indexed");

        assert_eq!(p as usize % align, 0);
        assert!(r.usable_size >= size);
        assert_eq!(r.page_up_size, util::align_up(size.max(1) + align, util::page_size()));
        assert_eq!(p as usize + r.usable_size, r.actual_start as usize + r.page_up_size);

        unsafe {
            std::ptr::write_bytes(p, 0xBB, r.usable_size);
            heap.deallocate(p);
        }
        assert!(!heap.is_large_object(p));
    }
});
