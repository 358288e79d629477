//! Kernel page cache of a real file.
//!
//! Residency is sampled with `mincore(2)` over a read-only mapping of the file and
//! pages are dropped with `posix_fadvise(POSIX_FADV_DONTNEED)`, which only evicts
//! clean pages that are not mapped by anyone.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use super::{ContentCache, LifecycleState, WHOLE_FILE};
use crate::util::pages_for;

pub struct HostFile {
    path: PathBuf,
}

impl HostFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_size() -> u64 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 { sz as u64 } else { 4096 }
    }

    fn resident_pages(&self) -> io::Result<u64> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(0);
        }
        // SAFETY: the mapping is read-only and only its address is used; the
        // contents are never dereferenced, so concurrent truncation is harmless.
        let map = unsafe { memmap2::MmapOptions::new().len(len as usize).map(&file) }?;
        let page_size = Self::page_size();
        let pages = pages_for(len, page_size) as usize;
        let mut vec = vec![0u8; pages];
        // SAFETY: `map` covers `len` bytes and `vec` holds one byte per page.
        let rc = unsafe {
            libc::mincore(
                map.as_ptr() as *mut libc::c_void,
                map.len(),
                vec.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(vec.iter().filter(|&&b| b & 1 == 1).count() as u64)
    }

    fn fadvise_dontneed(&self, start: u64, end: u64) -> io::Result<()> {
        let file = File::open(&self.path)?;
        let len = if end == WHOLE_FILE {
            0
        } else {
            end.saturating_sub(start).saturating_add(1)
        };
        // SAFETY: the descriptor is owned by `file` and outlives the call.
        let rc = unsafe {
            libc::posix_fadvise(
                file.as_raw_fd(),
                start as libc::off_t,
                len as libc::off_t,
                libc::POSIX_FADV_DONTNEED,
            )
        };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(())
    }
}

impl ContentCache for HostFile {
    fn state(&self) -> LifecycleState {
        LifecycleState::Stable
    }

    fn cached_pages(&self) -> u64 {
        match self.resident_pages() {
            Ok(n) => n,
            Err(e) => {
                debug!("mincore {:?} failed: {e}", self.path);
                0
            }
        }
    }

    fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn discard_clean(&self, start: u64, end: u64) -> u64 {
        if start > end {
            return 0;
        }
        let before = self.cached_pages();
        if let Err(e) = self.fadvise_dontneed(start, end) {
            warn!("fadvise {:?} failed: {e}", self.path);
            return 0;
        }
        before.saturating_sub(self.cached_pages())
    }
}
