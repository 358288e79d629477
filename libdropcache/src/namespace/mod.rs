//! In-memory namespace tree.
//!
//! Nodes are reference counted and shared between the tree, path lookup and any
//! traversal in flight. Every directory guards its own child map; there is no
//! lock over the whole tree except the rename mutex, which only serializes
//! renames against each other.
//!
//! Lock ordering: an ancestor's child map is always locked before a
//! descendant's. Renames between unrelated directories lock by inode number
//! while holding the rename mutex.
mod node;

pub use node::{Children, NamespaceNode, NodeKind, NodeRef, Validity};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::content::ContentRef;
use crate::error::{DropCacheError, Result};
use crate::util::lock;

pub const ROOT_INO: u64 = 1;

pub struct Namespace {
    root: NodeRef,
    next_ino: AtomicU64,
    rename_lock: Mutex<()>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a path into its components, skipping empty and `.` entries.
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(DropCacheError::InvalidPath(name.to_string()));
    }
    Ok(())
}

fn default_mode(kind: NodeKind) -> u32 {
    if kind.is_dir() { 0o755 } else { 0o644 }
}

/// Whether `ancestor` lies on the parent chain of `node`.
fn is_ancestor(ancestor: &NodeRef, node: &NodeRef) -> bool {
    let mut cur = node.parent();
    while let Some(p) = cur {
        if Arc::ptr_eq(&p, ancestor) {
            return true;
        }
        cur = p.parent();
    }
    false
}

impl Namespace {
    pub fn new() -> Self {
        let root = Arc::new(NamespaceNode::new(
            ROOT_INO,
            "",
            NodeKind::Directory,
            0,
            0o755,
            Weak::new(),
        ));
        Self {
            root,
            next_ino: AtomicU64::new(ROOT_INO + 1),
            rename_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    fn check_parent(parent: &NodeRef) -> Result<()> {
        if !parent.kind().is_dir() {
            return Err(DropCacheError::NotADirectory(parent.path()));
        }
        if parent.validity() == Validity::Dead {
            return Err(DropCacheError::NotFound(parent.path()));
        }
        Ok(())
    }

    pub fn create(&self, parent: &NodeRef, name: &str, kind: NodeKind) -> Result<NodeRef> {
        self.create_with(parent, name, kind, 0, default_mode(kind))
    }

    /// Create `name` under `parent` owned by `uid` with permission bits `mode`.
    pub fn create_with(
        &self,
        parent: &NodeRef,
        name: &str,
        kind: NodeKind,
        uid: u32,
        mode: u32,
    ) -> Result<NodeRef> {
        validate_name(name)?;
        let mut children = parent.children_mut();
        // checked under the lock so a concurrent unlink cannot orphan the new node
        Self::check_parent(parent)?;
        if children.contains_key(name) {
            return Err(DropCacheError::AlreadyExists(name.to_string()));
        }
        let node = Arc::new(NamespaceNode::new(
            self.alloc_ino(),
            name,
            kind,
            uid,
            mode & 0o7777,
            Arc::downgrade(parent),
        ));
        children.insert(name.to_string(), node.clone());
        trace!("created {name} (ino {}) under ino {}", node.ino(), parent.ino());
        Ok(node)
    }

    fn get_or_create_dir(&self, parent: &NodeRef, name: &str) -> Result<NodeRef> {
        validate_name(name)?;
        let mut children = parent.children_mut();
        Self::check_parent(parent)?;
        if let Some(child) = children.get(name) {
            if !child.kind().is_dir() {
                return Err(DropCacheError::NotADirectory(child.path()));
            }
            return Ok(child.clone());
        }
        let node = Arc::new(NamespaceNode::new(
            self.alloc_ino(),
            name,
            NodeKind::Directory,
            0,
            0o755,
            Arc::downgrade(parent),
        ));
        children.insert(name.to_string(), node.clone());
        Ok(node)
    }

    /// `mkdir -p`: create every missing directory along `path`.
    pub fn mkdir_p(&self, path: &str) -> Result<NodeRef> {
        let mut cur = self.root();
        for part in components(path) {
            cur = self.get_or_create_dir(&cur, part)?;
        }
        Ok(cur)
    }

    /// Create a node of `kind` at `path`, creating missing parent directories.
    pub fn create_node(
        &self,
        path: &str,
        kind: NodeKind,
        content: Option<ContentRef>,
    ) -> Result<NodeRef> {
        let parts: Vec<&str> = components(path).collect();
        let Some((name, dirs)) = parts.split_last() else {
            return Err(DropCacheError::InvalidPath(path.to_string()));
        };
        let mut parent = self.root();
        for part in dirs {
            parent = self.get_or_create_dir(&parent, part)?;
        }
        let node = self.create(&parent, name, kind)?;
        node.set_content(content);
        Ok(node)
    }

    pub fn create_file(&self, path: &str, content: Option<ContentRef>) -> Result<NodeRef> {
        self.create_node(path, NodeKind::Regular, content)
    }

    /// Plain lookup from the root, without permission or staleness checks.
    pub fn lookup(&self, path: &str) -> Result<NodeRef> {
        let mut cur = self.root();
        for part in components(path) {
            if part == ".." {
                cur = cur.parent().unwrap_or(cur);
                continue;
            }
            if !cur.kind().is_dir() {
                return Err(DropCacheError::NotADirectory(path.to_string()));
            }
            cur = cur
                .child(part)
                .ok_or_else(|| DropCacheError::NotFound(path.to_string()))?;
        }
        Ok(cur)
    }

    /// Remove `name` from `parent`. Directories must be empty. The detached node
    /// is marked dead; handles still holding it keep it alive.
    pub fn unlink(&self, parent: &NodeRef, name: &str) -> Result<NodeRef> {
        let mut children = parent.children_mut();
        let node = children
            .get(name)
            .cloned()
            .ok_or_else(|| DropCacheError::NotFound(name.to_string()))?;
        {
            // hold the victim's map so nothing is created in it while it goes away
            let victim = node.children_mut();
            if !victim.is_empty() {
                return Err(DropCacheError::NotEmpty(node.path()));
            }
            children.remove(name);
            node.set_validity(Validity::Dead);
        }
        drop(children);
        node.set_parent(Weak::new());
        trace!("unlinked {name} (ino {})", node.ino());
        Ok(node)
    }

    pub fn remove(&self, path: &str) -> Result<NodeRef> {
        let node = self.lookup(path)?;
        let parent = node
            .parent()
            .ok_or_else(|| DropCacheError::InvalidPath(path.to_string()))?;
        self.unlink(&parent, &node.name())
    }

    /// Move `old_parent/old_name` to `new_parent/new_name`. The target must not
    /// exist, and a directory cannot be moved below itself.
    pub fn rename(
        &self,
        old_parent: &NodeRef,
        old_name: &str,
        new_parent: &NodeRef,
        new_name: &str,
    ) -> Result<()> {
        validate_name(old_name)?;
        validate_name(new_name)?;
        let _serial = lock(&self.rename_lock);

        let node = old_parent
            .child(old_name)
            .ok_or_else(|| DropCacheError::NotFound(old_name.to_string()))?;
        if node.kind().is_dir() && (Arc::ptr_eq(&node, new_parent) || is_ancestor(&node, new_parent))
        {
            return Err(DropCacheError::InvalidPath(format!(
                "cannot move {} below itself",
                node.path()
            )));
        }

        if Arc::ptr_eq(old_parent, new_parent) {
            let mut children = old_parent.children_mut();
            if old_name == new_name {
                return Ok(());
            }
            if children.contains_key(new_name) {
                return Err(DropCacheError::AlreadyExists(new_name.to_string()));
            }
            let node = children
                .remove(old_name)
                .ok_or_else(|| DropCacheError::NotFound(old_name.to_string()))?;
            node.set_name(new_name);
            children.insert(new_name.to_string(), node);
            return Ok(());
        }

        let old_first = if is_ancestor(old_parent, new_parent) {
            true
        } else if is_ancestor(new_parent, old_parent) {
            false
        } else {
            old_parent.ino() < new_parent.ino()
        };
        let (mut g1, mut g2) = if old_first {
            (old_parent.children_mut(), new_parent.children_mut())
        } else {
            (new_parent.children_mut(), old_parent.children_mut())
        };
        let (src, dst) = if old_first {
            (&mut *g1, &mut *g2)
        } else {
            (&mut *g2, &mut *g1)
        };

        Self::check_parent(new_parent)?;
        if dst.contains_key(new_name) {
            return Err(DropCacheError::AlreadyExists(new_name.to_string()));
        }
        let node = src
            .remove(old_name)
            .ok_or_else(|| DropCacheError::NotFound(old_name.to_string()))?;
        node.set_name(new_name);
        node.set_parent(Arc::downgrade(new_parent));
        dst.insert(new_name.to_string(), node);
        Ok(())
    }
}
