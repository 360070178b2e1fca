//! Process-wide switches (spec.md §6). Both default to `false`, matching
//! the reference implementation, and are read without synchronization —
//! flipping them mid-flight from another thread is the caller's problem,
//! same as the reference.

use std::sync::atomic::{AtomicBool, Ordering};

static AUTO_FLUSH: AtomicBool = AtomicBool::new(false);
static CACHE_HEADERS: AtomicBool = AtomicBool::new(false);

/// When true, `create` and `update` issue an `fsync` before closing.
pub fn auto_flush() -> bool {
    AUTO_FLUSH.load(Ordering::Relaxed)
}

pub fn set_auto_flush(value: bool) {
    AUTO_FLUSH.store(value, Ordering::Relaxed);
}

/// When true, `info`/`fetch`/`update` consult the process-wide header
/// cache (see `whisper::cache`) instead of re-reading the header block.
pub fn cache_headers() -> bool {
    CACHE_HEADERS.load(Ordering::Relaxed)
}

pub fn set_cache_headers(value: bool) {
    CACHE_HEADERS.store(value, Ordering::Relaxed);
}
