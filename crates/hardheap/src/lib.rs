extern crate libc;

#[cfg(feature = "c-api")]
pub mod api;
pub mod config;
pub mod global_alloc;
pub mod hardening;
pub mod init;
pub mod large;
pub mod platform;
pub mod sync;
pub mod trace;
pub mod util;

pub use global_alloc::GuardedAlloc;
pub use hardening::self_check::IntegrityReport;
pub use init::heap;
pub use large::record::LargeRecord;
pub use large::{LargeHeap, LargeStats};
pub use platform::{OsPages, PageSource};
