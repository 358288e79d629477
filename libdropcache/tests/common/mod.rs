#![allow(dead_code)]

use std::sync::Arc;

use libdropcache::{Namespace, PageCache};
use log::LevelFilter;
use once_cell::sync::OnceCell;

pub const PAGE: u64 = libdropcache::content::page_cache::DEFAULT_PAGE_SIZE;

pub fn init_logger() {
    static LOGGER: OnceCell<()> = OnceCell::new();
    LOGGER.get_or_init(|| {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Trace)
            .is_test(true)
            .try_init();
    });
}

/// A page cache holding `clean` clean pages followed by `dirty` dirty ones.
pub fn cache_with(clean: u64, dirty: u64) -> Arc<PageCache> {
    let cache = Arc::new(PageCache::new());
    cache.fill(0, clean * PAGE);
    cache.write(clean * PAGE, dirty * PAGE);
    cache
}

pub fn file_with(ns: &Namespace, path: &str, clean: u64, dirty: u64) -> Arc<PageCache> {
    let cache = cache_with(clean, dirty);
    ns.create_file(path, Some(cache.clone())).unwrap();
    cache
}
