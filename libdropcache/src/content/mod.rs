//! Content objects backing namespace nodes.
//!
//! A content object owns the cached pages of one file. The invalidation engine
//! never creates or frees them: it only reads the lifecycle state and page count
//! and asks for clean pages to be discarded.
//!
//! Implementations:
//! - `page_cache`: page-granular in-memory cache with dirty and pinned pages
//! - `host`: a real file whose kernel page cache is queried and dropped (Linux)
use std::fmt;
use std::sync::Arc;

#[cfg(target_os = "linux")]
pub mod host;
pub mod page_cache;

/// End offset meaning "up to the end of the file".
pub const WHOLE_FILE: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Stable,
    /// Still being set up by the owning filesystem.
    Allocating,
    /// Being torn down by the owning filesystem.
    Freeing,
}

impl LifecycleState {
    pub fn is_transitional(self) -> bool {
        !matches!(self, LifecycleState::Stable)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stable => "stable",
            LifecycleState::Allocating => "allocating",
            LifecycleState::Freeing => "freeing",
        };
        f.write_str(s)
    }
}

/// Cached-page store of one content object.
pub trait ContentCache: Send + Sync {
    fn state(&self) -> LifecycleState;

    /// Pages currently cached, clean and dirty.
    fn cached_pages(&self) -> u64;

    /// File size in bytes.
    fn size(&self) -> u64;

    /// Drop clean, unreferenced pages overlapping the byte range `[start, end]`.
    /// Dirty pages are never touched. Returns the number of pages dropped.
    fn discard_clean(&self, start: u64, end: u64) -> u64;
}

pub type ContentRef = Arc<dyn ContentCache>;
