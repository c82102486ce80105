//! Call-stack capture for fatal reports, via the C library's execinfo.

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
mod imp {
    use core::ffi::{c_int, c_void};

    const MAX_FRAMES: usize = 64;

    extern "C" {
        fn backtrace(buffer: *mut *mut c_void, size: c_int) -> c_int;
        fn backtrace_symbols_fd(buffer: *const *mut c_void, size: c_int, fd: c_int);
    }

    pub fn prime() {
        // The first call may load the unwinder, which allocates. Do it during
        // init rather than on the way to abort().
        let mut frames = [core::ptr::null_mut::<c_void>(); 1];
        unsafe {
            backtrace(frames.as_mut_ptr(), 1);
        }
    }

    pub fn dump_stderr() {
        let mut frames = [core::ptr::null_mut::<c_void>(); MAX_FRAMES];
        unsafe {
            let n = backtrace(frames.as_mut_ptr(), MAX_FRAMES as c_int);
            if n > 0 {
                backtrace_symbols_fd(frames.as_ptr(), n, 2);
            }
        }
    }
}

#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos")))]
mod imp {
    pub fn prime() {}

    pub fn dump_stderr() {
        crate::trace::write_stderr(b"(call stack unavailable on this target)\n");
    }
}

/// Load whatever the unwinder needs so a later dump does not allocate.
pub fn prime() {
    imp::prime();
}

/// Write the current call stack to stderr, one frame per line.
pub fn dump_stderr() {
    imp::dump_stderr();
}
