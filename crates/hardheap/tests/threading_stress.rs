//! Thread stress tests for the large-object heap.
//!
//! Many threads allocate and free concurrently against one heap; afterwards
//! the index must be empty and every record seen along the way consistent.

use hardheap::LargeHeap;
use rand::Rng;
use std::collections::HashSet;
use std::ptr;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

/// Wrapper to allow sending `*mut u8` across thread boundaries.
/// Safety: ownership of each pointer moves with it; the heap is thread-safe.
#[derive(Clone, Copy)]
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

const THRESHOLD: usize = 16 * 1024;

fn new_heap() -> Arc<LargeHeap> {
    hardheap::init::init();
    Arc::new(LargeHeap::new())
}

// ---------------------------------------------------------------------------
// N threads doing M allocate/free cycles of random large sizes
// ---------------------------------------------------------------------------

fn stress_allocate_free(num_threads: usize, cycles: usize) {
    let heap = new_heap();
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let heap = Arc::clone(&heap);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..cycles {
                    let size = rng.gen_range(THRESHOLD..THRESHOLD * 16);
                    let align = 1usize << rng.gen_range(0..13);
                    let p = heap.allocate_aligned(align, size);
                    assert_eq!(p as usize % align, 0);
                    assert!(heap.object_size(p) >= size);
                    unsafe {
                        // Touch both ends of the object.
                        p.write(0xA5);
                        p.add(size - 1).write(0x5A);
                        heap.deallocate(p);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during allocate/free stress");
    }

    let stats = heap.stats();
    assert_eq!(stats.live_objects, 0, "index not empty after stress");
    assert_eq!(stats.mapped_bytes, 0);
    assert_eq!(stats.allocations, (num_threads * cycles) as u64);
    assert_eq!(stats.frees, stats.allocations);
}

#[test]
fn stress_allocate_free_4_threads() {
    stress_allocate_free(4, 500);
}

#[test]
fn stress_allocate_free_8_threads() {
    stress_allocate_free(8, 250);
}

#[test]
fn stress_allocate_free_16_threads() {
    stress_allocate_free(16, 100);
}

// ---------------------------------------------------------------------------
// No two live objects share an address
// ---------------------------------------------------------------------------

#[test]
fn concurrent_live_objects_never_share_an_address() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 64;

    let heap = new_heap();
    let barrier = Arc::new(Barrier::new(THREADS));
    let seen: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let heap = Arc::clone(&heap);
            let barrier = Arc::clone(&barrier);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                barrier.wait();
                let mut held = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let p = heap.allocate(THRESHOLD + i * 512);
                    assert!(
                        seen.lock().unwrap().insert(p as usize),
                        "address {:p} handed out twice while live",
                        p
                    );
                    held.push(SendPtr(p));
                }
                held
            })
        })
        .collect();

    let all: Vec<SendPtr> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(all.len(), THREADS * PER_THREAD);
    assert_eq!(heap.stats().live_objects, all.len());
    let report = heap.check_integrity();
    assert_eq!(report.records_checked, all.len());
    assert!(report.is_ok(), "{:?}", report);

    for p in all {
        unsafe { heap.deallocate(p.0) };
    }
    assert_eq!(heap.stats().live_objects, 0);
}

// ---------------------------------------------------------------------------
// Cross-thread free: thread A allocates, thread B frees
// ---------------------------------------------------------------------------

#[test]
fn cross_thread_free() {
    const COUNT: usize = 500;

    let heap = new_heap();
    let (tx, rx) = std::sync::mpsc::channel::<SendPtr>();

    let producer_heap = Arc::clone(&heap);
    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            let p = producer_heap.allocate(THRESHOLD + i);
            unsafe { ptr::write_bytes(p, 0xDD, THRESHOLD + i) };
            tx.send(SendPtr(p)).unwrap();
        }
    });

    let consumer_heap = Arc::clone(&heap);
    let consumer = thread::spawn(move || {
        let mut freed = 0;
        for p in rx {
            assert!(consumer_heap.is_large_object(p.0));
            unsafe {
                assert_eq!(*p.0, 0xDD);
                consumer_heap.deallocate(p.0);
            }
            freed += 1;
        }
        freed
    });

    producer.join().expect("producer panicked");
    assert_eq!(consumer.join().expect("consumer panicked"), COUNT);
    assert_eq!(heap.stats().live_objects, 0);
}

// ---------------------------------------------------------------------------
// Readers racing writers: size queries never see a torn record
// ---------------------------------------------------------------------------

#[test]
fn size_queries_race_with_frees() {
    const ROUNDS: usize = 200;

    let heap = new_heap();
    let shared: Arc<Mutex<Vec<SendPtr>>> = Arc::new(Mutex::new(Vec::new()));

    let writer_heap = Arc::clone(&heap);
    let writer_shared = Arc::clone(&shared);
    let writer = thread::spawn(move || {
        for i in 0..ROUNDS {
            let p = writer_heap.allocate(THRESHOLD * 2 + i);
            writer_shared.lock().unwrap().push(SendPtr(p));
            if i % 2 == 1 {
                let victim = writer_shared.lock().unwrap().remove(0);
                unsafe { writer_heap.deallocate(victim.0) };
            }
        }
    });

    let reader_heap = Arc::clone(&heap);
    let reader_shared = Arc::clone(&shared);
    let reader = thread::spawn(move || {
        for _ in 0..ROUNDS * 4 {
            let snapshot: Vec<SendPtr> = reader_shared.lock().unwrap().clone();
            for p in snapshot {
                // Either still live with a plausible size, or already gone.
                let size = reader_heap.object_size(p.0);
                assert!(size == 0 || size >= THRESHOLD * 2);
            }
        }
    });

    writer.join().expect("writer panicked");
    reader.join().expect("reader panicked");

    for p in shared.lock().unwrap().drain(..) {
        unsafe { heap.deallocate(p.0) };
    }
    assert_eq!(heap.stats().live_objects, 0);
}
