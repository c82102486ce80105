//! Allocation-free diagnostics.
//!
//! Everything printed by this crate goes through a fixed stack buffer and a
//! raw `write(2)` so it can run underneath the global allocator, inside a
//! fork child, or on the way to `abort()`.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// Longest diagnostic line; longer output is truncated.
pub const LINE_CAPACITY: usize = 256;

static TRACE_ENABLED: AtomicBool = AtomicBool::new(false);

/// `core::fmt::Write` over a fixed byte buffer. Silently truncates.
pub struct StackWriter<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> StackWriter<N> {
    pub const fn new() -> Self {
        StackWriter {
            buf: [0; N],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_truncated(&self) -> bool {
        self.len == N
    }

    /// Write the buffered bytes to stderr.
    pub fn flush_stderr(&self) {
        write_stderr(self.as_bytes());
    }
}

impl<const N: usize> Default for StackWriter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for StackWriter<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Write raw bytes to fd 2, retrying on short writes.
pub fn write_stderr(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(2, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if n <= 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Format one line and write it to stderr.
pub fn emit(args: fmt::Arguments<'_>) {
    let mut w = StackWriter::<LINE_CAPACITY>::new();
    let _ = fmt::Write::write_fmt(&mut w, args);
    let _ = fmt::Write::write_str(&mut w, "\n");
    if w.is_truncated() {
        w.buf[LINE_CAPACITY - 1] = b'\n';
    }
    w.flush_stderr();
}

pub fn set_enabled(on: bool) {
    TRACE_ENABLED.store(on, Ordering::Relaxed);
}

#[inline(always)]
pub fn enabled() -> bool {
    cfg!(feature = "trace") && TRACE_ENABLED.load(Ordering::Relaxed)
}

/// Debug-level trace line, compiled out unless the `trace` feature is on.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if $crate::trace::enabled() {
            $crate::trace::emit(format_args!($($arg)*));
        }
    };
}
