use crate::hardening::{backtrace, fork};
use crate::large::LargeHeap;
use crate::{config, util};
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

pub static INIT_STATE: AtomicU8 = AtomicU8::new(UNINIT);

/// The process-wide large heap. Its index and record pool map their storage
/// on first use, so building it needs no runtime work.
static HEAP: LargeHeap = LargeHeap::new();

/// Library constructor -- called before main().
#[used]
#[cfg_attr(target_os = "linux", link_section = ".init_array")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__mod_init_func")]
static CTOR: extern "C" fn() = {
    extern "C" fn ctor() {
        init();
    }
    ctor
};

/// One-shot startup: page size, environment config, fork handler, unwinder.
///
/// Safe to call from any thread and any number of times; callers racing the
/// first call wait until it has finished.
pub fn init() {
    match INIT_STATE.compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {}
        Err(INITIALIZING) => {
            while INIT_STATE.load(Ordering::Acquire) == INITIALIZING {
                core::hint::spin_loop();
            }
            return;
        }
        Err(_) => return,
    }

    // Single-threaded from here: every other caller spins above.
    unsafe {
        util::init_page_size();
        config::read_config();
        fork::register_atfork();
    }
    backtrace::prime();

    INIT_STATE.store(READY, Ordering::Release);
}

#[cold]
#[inline(never)]
fn init_slow() {
    init();
}

#[inline(always)]
pub fn is_ready() -> bool {
    INIT_STATE.load(Ordering::Acquire) == READY
}

/// The process-wide large heap, initializing the library if needed.
#[inline]
pub fn heap() -> &'static LargeHeap {
    if !is_ready() {
        init_slow();
    }
    &HEAP
}

/// The process-wide heap without the init check (fork handler).
#[inline(always)]
pub(crate) fn instance() -> &'static LargeHeap {
    &HEAP
}
