//! Fork safety: a pthread_atfork child handler that resets the heap's locks.
//!
//! After fork() only the forking thread survives in the child. Any lock held
//! by another thread at that moment would stay held forever, so the child
//! forces every large-heap lock open before running user code.

use core::sync::atomic::{AtomicBool, Ordering};

static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Child handler called after fork().
///
/// # Safety
/// Called by the C runtime in the child process, where only one thread
/// exists, so forcing the locks open cannot race.
unsafe extern "C" fn atfork_child() {
    crate::init::instance().reset_locks_after_fork();
}

/// Register the pthread_atfork handler. Repeated calls are no-ops.
///
/// # Safety
/// Must be called from the initialization path.
pub unsafe fn register_atfork() {
    if REGISTERED.swap(true, Ordering::AcqRel) {
        return;
    }
    libc::pthread_atfork(None, None, Some(atfork_child));
}
