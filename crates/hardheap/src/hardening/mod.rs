pub mod backtrace;
pub mod fork;
pub mod self_check;

#[cfg(feature = "detect-uaf")]
pub mod history;

use core::fmt;

/// Abort with a diagnostic message to stderr.
/// This is used when unrecoverable corruption is detected.
#[cold]
#[inline(never)]
pub fn abort_with_message(msg: &str) -> ! {
    crate::trace::write_stderr(msg.as_bytes());
    backtrace::dump_stderr();
    unsafe { libc::abort() }
}

/// Format a diagnostic line, dump the call stack and abort.
#[cold]
#[inline(never)]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    crate::trace::emit(args);
    backtrace::dump_stderr();
    unsafe { libc::abort() }
}

/// `ptr` was passed to free but names no live large object.
/// `freed_ago` is set when the address belongs to a recently freed one.
#[cold]
#[inline(never)]
pub fn invalid_free(ptr: *mut u8, freed_ago: Option<u64>) -> ! {
    match freed_ago {
        Some(ns) => fatal(format_args!(
            "hardheap: double free of large object {:#x} (freed {} ns ago)",
            ptr as usize, ns
        )),
        None => fatal(format_args!(
            "hardheap: invalid or double free of large object {:#x}",
            ptr as usize
        )),
    }
}

/// A size query named a large object that has already been freed.
#[cold]
#[inline(never)]
pub fn freed_size_query(ptr: *const u8, freed_ago: u64) -> ! {
    fatal(format_args!(
        "hardheap: size query on freed large object {:#x} (freed {} ns ago)",
        ptr as usize, freed_ago
    ))
}

/// The page source refused a mapping, or the size computation overflowed.
#[cold]
#[inline(never)]
pub fn out_of_memory(bytes: usize) -> ! {
    fatal(format_args!(
        "hardheap: out of memory mapping {} bytes for large object",
        bytes
    ))
}

/// The record pool or the address index could not get storage.
#[cold]
#[inline(never)]
pub fn metadata_exhausted() -> ! {
    abort_with_message("hardheap: out of memory for large-object metadata\n")
}

#[cold]
#[inline(never)]
pub fn invalid_alignment(alignment: usize) -> ! {
    fatal(format_args!(
        "hardheap: invalid alignment {} for large object",
        alignment
    ))
}
