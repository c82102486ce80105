#![no_main]

use hardheap::LargeHeap;
use libfuzzer_sys::fuzz_target;

/// Interprets a byte slice as a sequence of large-heap operations.
///
/// Each operation is encoded as:
///   byte 0: opcode (0=allocate, 1=allocate_aligned, 2=deallocate, 3=query)
///   byte 1-2: size in KiB above 16 KiB (little-endian u16, capped)
///   byte 3: slot index (which tracked pointer to operate on)
///
/// We track up to 64 live pointers. Frees only ever target live slots, so
/// the heap must never abort.
const MAX_SLOTS: usize = 64;

fuzz_target!(|data: &[u8]| {
    let heap = LargeHeap::new();
    let mut slots: [*mut u8; MAX_SLOTS] = [std::ptr::null_mut(); MAX_SLOTS];
    let mut sizes: [usize; MAX_SLOTS] = [0; MAX_SLOTS];

    let mut i = 0;
    while i + 4 <= data.len() {
        let opcode = data[i] & 0x03;
        let kib = u16::from_le_bytes([data[i + 1], data[i + 2]]) as usize % 1024;
        let slot = (data[i + 3] as usize) % MAX_SLOTS;
        i += 4;

        let size = 16 * 1024 + kib * 1024 + ((data[i - 4] as usize) >> 2);

        match opcode {
            0 | 1 => {
                if !slots[slot].is_null() {
                    unsafe { heap.deallocate(slots[slot]) };
                }
                let p = if opcode == 0 {
                    heap.allocate(size)
                } else {
                    let align = 1usize << (data[i - 1] % 17);
                    let p = heap.allocate_aligned(align, size);
                    assert_eq!(p as usize % align, 0);
                    p
                };
                assert!(heap.object_size(p) >= size);
                unsafe {
                    p.write(0xAA);
                    p.add(size - 1).write(0xBB);
                }
                slots[slot] = p;
                sizes[slot] = size;
            }
            2 => {
                if !slots[slot].is_null() {
                    unsafe { heap.deallocate(slots[slot]) };
                    assert!(!heap.is_large_object(slots[slot]));
                    slots[slot] = std::ptr::null_mut();
                    sizes[slot] = 0;
                }
            }
            _ => {
                let p = slots[slot];
                if p.is_null() {
                    assert_eq!(heap.object_size(p), 0);
                } else {
                    assert!(heap.is_large_object(p));
                    assert!(heap.object_size(p) >= sizes[slot]);
                    unsafe {
                        assert_eq!(p.read(), 0xAA);
                        assert_eq!(p.add(sizes[slot] - 1).read(), 0xBB);
                    }
                }
            }
        }
    }

    let live = slots.iter().filter(|p| !p.is_null()).count();
    assert_eq!(heap.stats().live_objects, live);
    assert!(heap.check_integrity().is_ok());

    for &p in slots.iter() {
        if !p.is_null() {
            unsafe { heap.deallocate(p) };
        }
    }
    assert_eq!(heap.stats().live_objects, 0);
});
