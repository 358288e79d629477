//! Lookup in an in-memory `Namespace`.

use std::sync::Arc;

use super::{Credentials, LookupFlags, PathResolver};
use crate::error::{DropCacheError, Result};
use crate::namespace::{Namespace, NamespaceNode, NodeRef, Validity, components};

pub struct NamespaceResolver {
    ns: Arc<Namespace>,
}

impl NamespaceResolver {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self { ns }
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.ns
    }
}

/// Search (execute) permission on a directory.
fn may_search(dir: &NamespaceNode, creds: &Credentials) -> bool {
    if creds.admin {
        return true;
    }
    let bit = if dir.uid() == creds.uid { 0o100 } else { 0o001 };
    dir.mode() & bit != 0
}

fn check_valid(node: &NamespaceNode, flags: LookupFlags, path: &str) -> Result<()> {
    match node.validity() {
        Validity::Valid => Ok(()),
        Validity::NeedsRevalidate if flags.contains(LookupFlags::REVAL) && node.revalidate() => {
            trace!("revalidated ino {}", node.ino());
            Ok(())
        }
        _ => Err(DropCacheError::StaleReference(path.to_string())),
    }
}

impl PathResolver for NamespaceResolver {
    /// Relative paths start at the root. Symlink nodes carry no target in the
    /// in-memory namespace and resolve to themselves.
    fn lookup(&self, creds: &Credentials, path: &str, flags: LookupFlags) -> Result<NodeRef> {
        if path.is_empty() {
            return Err(DropCacheError::NotFound(String::new()));
        }
        let mut cur = self.ns.root();
        for part in components(path) {
            if !cur.kind().is_dir() {
                return Err(DropCacheError::NotADirectory(path.to_string()));
            }
            if !may_search(&cur, creds) {
                return Err(DropCacheError::PermissionDenied(path.to_string()));
            }
            if part == ".." {
                cur = cur.parent().unwrap_or(cur);
                continue;
            }
            let next = cur
                .child(part)
                .ok_or_else(|| DropCacheError::NotFound(path.to_string()))?;
            check_valid(&next, flags, path)?;
            cur = next;
        }
        Ok(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NodeKind;

    fn setup() -> NamespaceResolver {
        let ns = Arc::new(Namespace::new());
        let private = ns
            .create_with(&ns.root(), "private", NodeKind::Directory, 1000, 0o700)
            .unwrap();
        ns.create(&private, "secret", NodeKind::Regular).unwrap();
        ns.create_file("/pub/file", None).unwrap();
        ns.create_node("/pub/link", NodeKind::Symlink, None).unwrap();
        NamespaceResolver::new(ns)
    }

    #[test]
    fn test_lookup_paths() {
        let r = setup();
        let root = Credentials::root();
        assert_eq!(r.resolve(&root, "/").unwrap().path(), "/");
        assert_eq!(r.resolve(&root, "pub/file").unwrap().path(), "/pub/file");
        assert_eq!(r.resolve(&root, "/pub/../pub//file").unwrap().path(), "/pub/file");
        assert_eq!(r.resolve(&root, "/..").unwrap().path(), "/");
        assert_eq!(r.resolve(&root, "/pub/link").unwrap().kind(), NodeKind::Symlink);
    }

    #[test]
    fn test_lookup_errors() {
        let r = setup();
        let root = Credentials::root();
        assert!(matches!(r.resolve(&root, ""), Err(DropCacheError::NotFound(_))));
        assert!(matches!(
            r.resolve(&root, "/does/not/exist"),
            Err(DropCacheError::NotFound(_))
        ));
        assert!(matches!(
            r.resolve(&root, "/pub/file/x"),
            Err(DropCacheError::NotADirectory(_))
        ));
        assert!(matches!(
            r.resolve(&root, "/pub/link/x"),
            Err(DropCacheError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_search_permission() {
        let r = setup();
        let owner = Credentials::user(1000);
        let other = Credentials::user(1001);
        assert!(r.resolve(&owner, "/private/secret").is_ok());
        assert!(matches!(
            r.resolve(&other, "/private/secret"),
            Err(DropCacheError::PermissionDenied(_))
        ));
        // the directory itself can be named, only searching it is denied
        assert!(r.resolve(&other, "/private").is_ok());
        assert!(r.resolve(&Credentials::root(), "/private/secret").is_ok());
    }

    #[test]
    fn test_stale_nodes() {
        let r = setup();
        let root = Credentials::root();
        let file = r.namespace().lookup("/pub/file").unwrap();

        file.set_validity(Validity::NeedsRevalidate);
        assert!(matches!(
            r.lookup(&root, "/pub/file", LookupFlags::FOLLOW),
            Err(DropCacheError::StaleReference(_))
        ));
        // resolve retries with REVAL and succeeds
        assert_eq!(r.resolve(&root, "/pub/file").unwrap().ino(), file.ino());
        assert_eq!(file.validity(), Validity::Valid);

        file.set_validity(Validity::Dead);
        assert!(matches!(
            r.resolve(&root, "/pub/file"),
            Err(DropCacheError::StaleReference(_))
        ));
    }
}
