#![cfg(target_os = "linux")]

mod common;

use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use common::init_logger;
use libdropcache::config::HostConfig;
use libdropcache::content::host::HostFile;
use libdropcache::resolve::host::HostResolver;
use libdropcache::{ContentCache, InvalidationService, WHOLE_FILE};
use tempfile::TempDir;

// tmpfs pages cannot be dropped, so stay on the build directory's filesystem.
fn disk_tempdir() -> TempDir {
    tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap()
}

/// Write `len` bytes, flush them to disk and read them back into the cache.
fn cached_file(path: &Path, len: usize) {
    let mut f = File::create(path).unwrap();
    f.write_all(&vec![0x5au8; len]).unwrap();
    f.sync_all().unwrap();
    drop(f);
    let mut buf = Vec::new();
    File::open(path).unwrap().read_to_end(&mut buf).unwrap();
    assert_eq!(buf.len(), len);
}

#[test]
fn test_discard_empties_synced_file() {
    init_logger();
    let dir = disk_tempdir();
    let path = dir.path().join("synced.bin");
    cached_file(&path, 1024 * 1024);

    let host = HostFile::new(&path);
    let before = host.cached_pages();
    let dropped = host.discard_clean(0, WHOLE_FILE);
    if before > 0 {
        assert_eq!(host.cached_pages(), 0);
        assert!(dropped > 0 && dropped <= before);
    } else {
        assert_eq!(dropped, 0);
    }
}

#[test]
fn test_non_utf8_names_are_evicted() {
    init_logger();
    let dir = disk_tempdir();
    let bad: PathBuf = dir.path().join(OsStr::from_bytes(b"bad\xff"));
    let good = dir.path().join("good");
    cached_file(&bad, 64 * 1024);
    cached_file(&good, 64 * 1024);
    let bad_before = HostFile::new(&bad).cached_pages();
    let good_before = HostFile::new(&good).cached_pages();

    let root = HostResolver::new(HostConfig::default())
        .resolve_path(dir.path())
        .unwrap();
    let names: Vec<String> = root.children().keys().cloned().collect();
    assert_eq!(names, vec!["bad\u{FFFD}".to_string(), "good".to_string()]);

    let report = InvalidationService::new().invalidate(&root).unwrap();
    assert_eq!(report.visited, 3);

    if bad_before > 0 {
        assert_eq!(HostFile::new(&bad).cached_pages(), 0);
    }
    if good_before > 0 {
        assert_eq!(HostFile::new(&good).cached_pages(), 0);
    }
    assert!(report.pages_dropped <= bad_before + good_before);
}
