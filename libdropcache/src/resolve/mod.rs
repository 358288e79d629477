//! Path resolution.
//!
//! A resolver turns a path string into the node an invalidation starts from.
//! Lookup failing with a stale reference is retried exactly once with
//! `LookupFlags::REVAL`, which makes the resolver revalidate what it would
//! otherwise trust.
use bitflags::bitflags;

use crate::error::Result;
use crate::namespace::NodeRef;

#[cfg(target_os = "linux")]
pub mod host;
pub mod namespace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LookupFlags: u32 {
        /// Follow a symlink in the final component.
        const FOLLOW = 1 << 0;
        /// Revalidate entries instead of trusting cached state.
        const REVAL = 1 << 1;
    }
}

/// Identity a request runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    /// Holder of the privilege the global cache drop requires.
    pub admin: bool,
}

impl Credentials {
    pub fn root() -> Self {
        Self { uid: 0, admin: true }
    }

    pub fn user(uid: u32) -> Self {
        Self { uid, admin: uid == 0 }
    }

    /// Effective identity of this process.
    pub fn current() -> Self {
        let uid = nix::unistd::geteuid();
        Self {
            uid: uid.as_raw(),
            admin: uid.is_root(),
        }
    }
}

pub trait PathResolver: Send + Sync {
    fn lookup(&self, creds: &Credentials, path: &str, flags: LookupFlags) -> Result<NodeRef>;

    fn resolve(&self, creds: &Credentials, path: &str) -> Result<NodeRef> {
        match self.lookup(creds, path, LookupFlags::FOLLOW) {
            Err(e) if e.is_stale() => {
                debug!("stale reference resolving {path}, retrying with revalidation");
                self.lookup(creds, path, LookupFlags::FOLLOW | LookupFlags::REVAL)
            }
            res => res,
        }
    }
}
