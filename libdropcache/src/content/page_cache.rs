//! Page-granular in-memory cache.
//!
//! Pages are tracked by index. A page is either clean (identical to the backing
//! store) or dirty (written but not yet flushed), and may be pinned by readers
//! holding a reference. Only clean, unpinned pages are ever discarded.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ContentCache, LifecycleState, WHOLE_FILE};
use crate::util::{lock, pages_for};

pub const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Page {
    dirty: bool,
    refs: u32,
}

#[derive(Default)]
struct PageTable {
    pages: BTreeMap<u64, Page>,
    size: u64,
}

pub struct PageCache {
    page_size: u64,
    state: Mutex<LifecycleState>,
    table: Mutex<PageTable>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageCache {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: u64) -> Self {
        assert!(page_size > 0, "page size must be non-zero");
        Self {
            page_size,
            state: Mutex::new(LifecycleState::Stable),
            table: Mutex::new(PageTable::default()),
        }
    }

    /// A cache that is still being constructed by its filesystem.
    pub fn allocating() -> Self {
        let cache = Self::new();
        cache.set_state(LifecycleState::Allocating);
        cache
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn set_state(&self, state: LifecycleState) {
        *lock(&self.state) = state;
    }

    fn page_range(&self, offset: u64, len: u64) -> Option<(u64, u64)> {
        if len == 0 {
            return None;
        }
        let first = offset / self.page_size;
        let last = offset.saturating_add(len - 1) / self.page_size;
        Some((first, last))
    }

    /// Cache `[offset, offset + len)` as read from the backing store.
    /// Pages already present keep their dirty bit. Returns newly cached pages.
    pub fn fill(&self, offset: u64, len: u64) -> u64 {
        let Some((first, last)) = self.page_range(offset, len) else {
            return 0;
        };
        let mut table = lock(&self.table);
        let mut added = 0;
        for index in first..=last {
            if let std::collections::btree_map::Entry::Vacant(e) = table.pages.entry(index) {
                e.insert(Page::default());
                added += 1;
            }
        }
        table.size = table.size.max(offset.saturating_add(len));
        added
    }

    /// Modify `[offset, offset + len)`, leaving the covered pages dirty.
    pub fn write(&self, offset: u64, len: u64) {
        let Some((first, last)) = self.page_range(offset, len) else {
            return;
        };
        let mut table = lock(&self.table);
        for index in first..=last {
            table.pages.entry(index).or_default().dirty = true;
        }
        table.size = table.size.max(offset.saturating_add(len));
    }

    /// Flush every dirty page. Returns how many pages were cleaned.
    pub fn writeback(&self) -> u64 {
        let mut table = lock(&self.table);
        let mut cleaned = 0;
        for page in table.pages.values_mut().filter(|p| p.dirty) {
            page.dirty = false;
            cleaned += 1;
        }
        cleaned
    }

    /// Take a reference on a cached page. Returns false if the page is not cached.
    pub fn pin(&self, index: u64) -> bool {
        match lock(&self.table).pages.get_mut(&index) {
            Some(page) => {
                page.refs += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&self, index: u64) {
        if let Some(page) = lock(&self.table).pages.get_mut(&index) {
            page.refs = page.refs.saturating_sub(1);
        }
    }

    /// Shrink or grow the file. Pages past the new end are dropped whatever
    /// their state, as truncation discards their contents.
    pub fn truncate(&self, size: u64) {
        let mut table = lock(&self.table);
        let keep = pages_for(size, self.page_size);
        table.pages.retain(|&index, _| index < keep);
        table.size = size;
    }

    pub fn clean_pages(&self) -> u64 {
        lock(&self.table).pages.values().filter(|p| !p.dirty).count() as u64
    }

    pub fn dirty_pages(&self) -> u64 {
        lock(&self.table).pages.values().filter(|p| p.dirty).count() as u64
    }

    pub fn pinned_pages(&self) -> u64 {
        lock(&self.table).pages.values().filter(|p| p.refs > 0).count() as u64
    }
}

impl ContentCache for PageCache {
    fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    fn cached_pages(&self) -> u64 {
        lock(&self.table).pages.len() as u64
    }

    fn size(&self) -> u64 {
        lock(&self.table).size
    }

    fn discard_clean(&self, start: u64, end: u64) -> u64 {
        if start > end {
            return 0;
        }
        let first = start / self.page_size;
        let last = if end == WHOLE_FILE {
            u64::MAX
        } else {
            end / self.page_size
        };
        let mut table = lock(&self.table);
        let victims: Vec<u64> = table
            .pages
            .range(first..=last)
            .filter(|(_, p)| !p.dirty && p.refs == 0)
            .map(|(&index, _)| index)
            .collect();
        for index in &victims {
            table.pages.remove(index);
        }
        victims.len() as u64
    }
}
