//! Subtree traversal.
//!
//! The walk keeps an explicit stack of pending nodes so deep hierarchies cannot
//! exhaust the call stack. Each node's child map is read-locked only while its
//! children are captured and the node itself is visited; no two node locks are
//! ever held at once, so concurrent creates, unlinks and renames elsewhere in the
//! tree proceed while a walk is running.
//!
//! Nodes added after their parent was captured are missed and nodes moved away
//! after capture are still visited. Both are fine for best-effort eviction.

use crate::namespace::NodeRef;

#[derive(Clone, Copy, Debug, Default)]
pub struct TreeWalker;

impl TreeWalker {
    pub fn new() -> Self {
        Self
    }

    /// Visit `root` and every node below it depth first, in name order.
    /// Returns the number of visited nodes.
    ///
    /// `visit` runs while the visited node's child map is read-locked, so it
    /// must not create or remove children of that node.
    pub fn walk<F>(&self, root: &NodeRef, mut visit: F) -> u64
    where
        F: FnMut(&NodeRef),
    {
        let mut pending = vec![root.clone()];
        let mut visited = 0;
        while let Some(node) = pending.pop() {
            let children = node.children();
            let snapshot: Vec<NodeRef> = children.values().cloned().collect();
            visit(&node);
            drop(children);
            visited += 1;
            pending.extend(snapshot.into_iter().rev());
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    #[test]
    fn test_walk_visits_depth_first_in_name_order() {
        let ns = Namespace::new();
        ns.create_file("/a/x", None).unwrap();
        ns.create_file("/a/y", None).unwrap();
        ns.create_file("/b", None).unwrap();

        let mut seen = Vec::new();
        let n = TreeWalker::new().walk(&ns.root(), |node| seen.push(node.path()));
        assert_eq!(n, 5);
        assert_eq!(seen, vec!["/", "/a", "/a/x", "/a/y", "/b"]);
    }

    #[test]
    fn test_walk_single_file() {
        let ns = Namespace::new();
        let f = ns.create_file("/only", None).unwrap();
        assert_eq!(TreeWalker::new().walk(&f, |_| {}), 1);
    }

    #[test]
    fn test_walk_deep_chain_does_not_recurse() {
        let ns = Namespace::new();
        let path = (0..20_000).map(|i| format!("d{i}")).collect::<Vec<_>>().join("/");
        ns.mkdir_p(&path).unwrap();
        assert_eq!(TreeWalker::new().walk(&ns.root(), |_| {}), 20_001);
    }

    #[test]
    fn test_walk_releases_lock_between_nodes() {
        let ns = Namespace::new();
        ns.create_file("/dir/f", None).unwrap();
        let dir = ns.lookup("/dir").unwrap();
        // while visiting the child, its parent's map must be writable again
        TreeWalker::new().walk(&dir, |node| {
            if node.name() == "f" {
                ns.create(&dir, "late", crate::namespace::NodeKind::Regular)
                    .unwrap();
            }
        });
        assert!(ns.lookup("/dir/late").is_ok());
    }
}
