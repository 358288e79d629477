//! Resolution against the host filesystem.
//!
//! The resolved path and everything beneath it is mirrored into a private
//! namespace whose regular files are backed by `HostFile`, so the ordinary walk
//! drops the kernel page cache of the real files. Permission checks are left to
//! the kernel: directories we cannot read are skipped with a warning.
//!
//! Host names are arbitrary bytes. A name that is not UTF-8 is keyed by its
//! lossy form, with a `~N` suffix when that key is already taken; the node's
//! `HostFile` keeps the real path.

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Credentials, LookupFlags, PathResolver};
use crate::config::HostConfig;
use crate::content::host::HostFile;
use crate::error::{DropCacheError, Result};
use crate::namespace::{Namespace, NodeKind, NodeRef};

pub struct HostResolver {
    config: HostConfig,
}

impl HostResolver {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }
}

fn kind_of(ft: &fs::FileType) -> NodeKind {
    if ft.is_dir() {
        NodeKind::Directory
    } else if ft.is_symlink() {
        NodeKind::Symlink
    } else if ft.is_socket() {
        NodeKind::Socket
    } else if ft.is_fifo() {
        NodeKind::Fifo
    } else if ft.is_char_device() {
        NodeKind::CharDevice
    } else if ft.is_block_device() {
        NodeKind::BlockDevice
    } else {
        NodeKind::Regular
    }
}

/// Create `name` under `dir`, appending `~1`, `~2`, ... while the name is taken.
fn create_unique(
    ns: &Namespace,
    dir: &NodeRef,
    name: &str,
    kind: NodeKind,
    meta: &fs::Metadata,
) -> Result<NodeRef> {
    let mut candidate = name.to_string();
    let mut suffix = 0u32;
    loop {
        match ns.create_with(dir, &candidate, kind, meta.uid(), meta.mode()) {
            Err(DropCacheError::AlreadyExists(_)) => {
                suffix += 1;
                candidate = format!("{name}~{suffix}");
            }
            res => return res,
        }
    }
}

/// Mirror `path` (already stat'ed as `meta`) into a fresh namespace and return
/// the node standing for it.
pub fn mirror(path: &Path, meta: &fs::Metadata, config: &HostConfig) -> Result<NodeRef> {
    let ns = Namespace::new();
    let root = ns.root();

    if !meta.is_dir() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let kind = kind_of(&meta.file_type());
        let node = ns.create_with(&root, &name, kind, meta.uid(), meta.mode())?;
        if kind == NodeKind::Regular {
            node.set_content(Some(Arc::new(HostFile::new(path))));
        }
        return Ok(node);
    }

    let dev = meta.dev();
    let mut pending: Vec<(NodeRef, PathBuf)> = vec![(root.clone(), path.to_path_buf())];
    let mut mirrored = 0u64;
    while let Some((dir, dir_path)) = pending.pop() {
        let entries = match fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("skip {dir_path:?}: {e}");
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skip entry in {dir_path:?}: {e}");
                    continue;
                }
            };
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy().into_owned();
            let child_path = entry.path();
            let child_meta = match fs::symlink_metadata(&child_path) {
                Ok(m) => m,
                Err(e) => {
                    // raced with an unlink
                    debug!("skip {child_path:?}: {e}");
                    continue;
                }
            };
            let kind = kind_of(&child_meta.file_type());
            let node = create_unique(&ns, &dir, &name, kind, &child_meta)?;
            if file_name.to_str() != Some(node.name().as_str()) {
                debug!("mirrored {child_path:?} as {}", node.name());
            }
            mirrored += 1;
            match kind {
                NodeKind::Regular => {
                    node.set_content(Some(Arc::new(HostFile::new(&child_path))));
                }
                NodeKind::Directory => {
                    if config.one_file_system && child_meta.dev() != dev {
                        debug!("not crossing into mount at {child_path:?}");
                        continue;
                    }
                    pending.push((node, child_path));
                }
                _ => {}
            }
        }
    }
    debug!("mirrored {mirrored} entries below {path:?}");
    Ok(root)
}

impl HostResolver {
    fn lookup_path(&self, path: &Path, flags: LookupFlags) -> Result<NodeRef> {
        let display = path.to_string_lossy();
        if display.is_empty() {
            return Err(DropCacheError::NotFound(String::new()));
        }
        let meta = if flags.contains(LookupFlags::FOLLOW) {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
        .map_err(|e| DropCacheError::from_io(&display, e))?;
        mirror(path, &meta, &self.config)
    }

    /// `resolve` for host paths that need not be UTF-8.
    pub fn resolve_path(&self, path: &Path) -> Result<NodeRef> {
        match self.lookup_path(path, LookupFlags::FOLLOW) {
            Err(e) if e.is_stale() => {
                debug!("stale reference resolving {path:?}, retrying");
                self.lookup_path(path, LookupFlags::FOLLOW | LookupFlags::REVAL)
            }
            res => res,
        }
    }
}

impl PathResolver for HostResolver {
    fn lookup(&self, _creds: &Credentials, path: &str, flags: LookupFlags) -> Result<NodeRef> {
        self.lookup_path(Path::new(path), flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentCache;
    use std::io::Write;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_mirror_directory_tree() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        let mut f = fs::File::create(tmp.path().join("a/b/data")).unwrap();
        f.write_all(b"hello page cache").unwrap();
        fs::File::create(tmp.path().join("top")).unwrap();
        symlink(tmp.path().join("top"), tmp.path().join("a/link")).unwrap();

        let resolver = HostResolver::new(HostConfig::default());
        let root = resolver
            .resolve(&Credentials::current(), tmp.path().to_str().unwrap())
            .unwrap();
        assert_eq!(root.kind(), NodeKind::Directory);
        let names: Vec<String> = root.children().keys().cloned().collect();
        assert_eq!(names, vec!["a".to_string(), "top".to_string()]);

        let a = root.child("a").unwrap();
        let link = a.child("link").unwrap();
        assert_eq!(link.kind(), NodeKind::Symlink);
        assert!(link.content().is_none());

        let data = a.child("b").unwrap().child("data").unwrap();
        assert_eq!(data.path(), "/a/b/data");
        let content = data.content().unwrap();
        assert_eq!(content.size(), 16);
    }

    #[test]
    fn test_resolve_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("single");
        fs::write(&path, vec![1u8; 8192]).unwrap();

        let resolver = HostResolver::new(HostConfig::default());
        let node = resolver
            .resolve(&Credentials::current(), path.to_str().unwrap())
            .unwrap();
        assert_eq!(node.kind(), NodeKind::Regular);
        assert_eq!(node.name(), "single");
        assert_eq!(node.content().unwrap().size(), 8192);
    }

    #[test]
    fn test_lossy_names_do_not_collide() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join(OsStr::from_bytes(b"bad\xff"));
        fs::write(&raw, b"raw").unwrap();
        fs::write(tmp.path().join("bad\u{FFFD}"), b"lossy").unwrap();
        fs::write(tmp.path().join("good"), b"good").unwrap();

        let root = HostResolver::new(HostConfig::default())
            .resolve_path(tmp.path())
            .unwrap();
        let names: Vec<String> = root.children().keys().cloned().collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"bad\u{FFFD}".to_string()));
        assert!(names.contains(&"bad\u{FFFD}~1".to_string()));
        assert!(names.contains(&"good".to_string()));

        let mut sizes: Vec<u64> = ["bad\u{FFFD}", "bad\u{FFFD}~1"]
            .iter()
            .map(|n| root.child(n).unwrap().content().unwrap().size())
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![3, 5]);

        let single = HostResolver::new(HostConfig::default())
            .resolve_path(&raw)
            .unwrap();
        assert_eq!(single.name(), "bad\u{FFFD}");
        assert_eq!(single.content().unwrap().size(), 3);
    }

    #[test]
    fn test_resolve_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        let resolver = HostResolver::new(HostConfig::default());
        let err = resolver
            .resolve(&Credentials::current(), missing.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, DropCacheError::NotFound(_)));
        assert!(matches!(
            resolver.resolve(&Credentials::current(), ""),
            Err(DropCacheError::NotFound(_))
        ));
    }
}
