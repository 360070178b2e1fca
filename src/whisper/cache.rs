//! Process-wide header memoization (spec.md §4.8). Headers are immutable
//! for the lifetime of a file (§3), so entries are never invalidated —
//! if a path is recreated with a different schema while cached, readers
//! will see the stale header until the process restarts. This mirrors
//! the reference implementation's documented limitation; see DESIGN.md.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use lru_cache::LruCache;

use crate::whisper::header::Header;

/// Large enough that eviction is never observed in practice for a single
/// process's working set of whisper files; not a correctness boundary.
const CAPACITY: usize = 4096;

static CACHE: OnceLock<Mutex<LruCache<PathBuf, Header>>> = OnceLock::new();

fn cache() -> &'static Mutex<LruCache<PathBuf, Header>> {
    CACHE.get_or_init(|| Mutex::new(LruCache::new(CAPACITY)))
}

pub fn get(path: &Path) -> Option<Header> {
    let mut guard = cache().lock().expect("header cache mutex poisoned");
    guard.get_mut(&path.to_path_buf()).cloned()
}

pub fn insert(path: &Path, header: Header) {
    let mut guard = cache().lock().expect("header cache mutex poisoned");
    guard.insert(path.to_path_buf(), header);
}
