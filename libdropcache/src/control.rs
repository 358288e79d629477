//! Control entries.
//!
//! A `ControlRegistry` plays the part of a sysctl-style control tree: named
//! entries with permission bits, each backed by a `ControlHandler`. Registering
//! returns a `Registration` owned by whoever started the service; dropping it
//! removes the entry again.
//!
//! `DropCachesPath` is the handler behind `vm/drop_caches_path`: writing a path
//! drops clean cached pages of that path and everything beneath it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::error::{DropCacheError, Result};
use crate::resolve::{Credentials, PathResolver};
use crate::service::InvalidationService;
use crate::util::{read, write};

pub const DROP_CACHES_PATH: &str = "vm/drop_caches_path";

pub trait ControlHandler: Send + Sync {
    /// Consume `buf`. Returns the number of bytes accepted.
    fn write(&self, creds: &Credentials, buf: &mut [u8]) -> Result<usize>;

    /// Fill `buf`. Returns the number of bytes produced.
    fn read(&self, creds: &Credentials, buf: &mut [u8]) -> Result<usize>;
}

struct Entry {
    id: u64,
    mode: u32,
    handler: Arc<dyn ControlHandler>,
}

#[derive(Default)]
struct RegistryInner {
    entries: RwLock<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct ControlRegistry {
    inner: Arc<RegistryInner>,
}

/// Handle keeping a control entry registered.
#[must_use = "dropping the registration removes the entry"]
pub struct Registration {
    name: String,
    id: u64,
    registry: Weak<RegistryInner>,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut entries = write(&inner.entries);
        if entries.get(&self.name).is_some_and(|e| e.id == self.id) {
            entries.remove(&self.name);
            info!("unregistered control entry {}", self.name);
        }
    }
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

fn check_access(creds: &Credentials, mode: u32, access: Access, name: &str) -> Result<()> {
    if creds.admin {
        return Ok(());
    }
    let bit = match access {
        Access::Read => 0o004,
        Access::Write => 0o002,
    };
    if mode & bit == 0 {
        return Err(DropCacheError::PermissionDenied(name.to_string()));
    }
    Ok(())
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        handler: Arc<dyn ControlHandler>,
        mode: u32,
    ) -> Result<Registration> {
        let mut entries = write(&self.inner.entries);
        if entries.contains_key(name) {
            return Err(DropCacheError::Busy(name.to_string()));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(name.to_string(), Entry { id, mode, handler });
        info!("registered control entry {name} (mode {mode:o})");
        Ok(Registration {
            name: name.to_string(),
            id,
            registry: Arc::downgrade(&self.inner),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.inner.entries).contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<(Arc<dyn ControlHandler>, u32)> {
        read(&self.inner.entries)
            .get(name)
            .map(|e| (e.handler.clone(), e.mode))
            .ok_or_else(|| DropCacheError::NotFound(name.to_string()))
    }

    pub fn write(&self, name: &str, creds: &Credentials, buf: &mut [u8]) -> Result<usize> {
        let (handler, mode) = self.entry(name)?;
        check_access(creds, mode, Access::Write, name)?;
        handler.write(creds, buf)
    }

    pub fn read(&self, name: &str, creds: &Credentials, buf: &mut [u8]) -> Result<usize> {
        let (handler, mode) = self.entry(name)?;
        check_access(creds, mode, Access::Read, name)?;
        handler.read(creds, buf)
    }
}

pub struct DropCachesPath<R> {
    resolver: R,
    service: InvalidationService,
}

impl<R: PathResolver> DropCachesPath<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            service: InvalidationService::new(),
        }
    }
}

/// Terminate the buffer in place by overwriting its last byte and return the
/// text before the first NUL. A trailing newline is thereby dropped; a caller
/// that sends no terminator loses its last character.
pub fn parse_path(buf: &mut [u8]) -> Result<&str> {
    if let Some(last) = buf.last_mut() {
        *last = 0;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).map_err(|_| {
        DropCacheError::InvalidPath(String::from_utf8_lossy(&buf[..end]).into_owned())
    })
}

impl<R: PathResolver> ControlHandler for DropCachesPath<R> {
    fn write(&self, creds: &Credentials, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        let path = parse_path(buf)?.to_string();
        let root = self.resolver.resolve(creds, &path)?;
        let report = self.service.invalidate(&root)?;
        info!("drop_caches_path {path}: {report}");
        Ok(len)
    }

    fn read(&self, _creds: &Credentials, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}
