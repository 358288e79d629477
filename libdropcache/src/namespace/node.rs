use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::content::ContentRef;
use crate::util::{lock, read, write};

pub type NodeRef = Arc<NamespaceNode>;
pub type Children = BTreeMap<String, NodeRef>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    Regular,
    Symlink,
    Socket,
    Fifo,
    CharDevice,
    BlockDevice,
}

impl NodeKind {
    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// Whether a node can still be trusted by path lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    /// Lookup must revalidate the node before using it.
    NeedsRevalidate,
    /// The node is gone from its filesystem; revalidation fails.
    Dead,
}

impl Validity {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Validity::Valid,
            1 => Validity::NeedsRevalidate,
            _ => Validity::Dead,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Validity::Valid => 0,
            Validity::NeedsRevalidate => 1,
            Validity::Dead => 2,
        }
    }
}

/// One entry of the namespace tree.
///
/// The child map is guarded by its own lock; holding it only protects the
/// membership of this directory, never the subtree below it.
pub struct NamespaceNode {
    ino: u64,
    kind: NodeKind,
    uid: u32,
    mode: u32,
    name: Mutex<String>,
    parent: Mutex<Weak<NamespaceNode>>,
    children: RwLock<Children>,
    content: RwLock<Option<ContentRef>>,
    validity: AtomicU8,
}

impl NamespaceNode {
    pub(crate) fn new(
        ino: u64,
        name: &str,
        kind: NodeKind,
        uid: u32,
        mode: u32,
        parent: Weak<NamespaceNode>,
    ) -> Self {
        Self {
            ino,
            kind,
            uid,
            mode,
            name: Mutex::new(name.to_string()),
            parent: Mutex::new(parent),
            children: RwLock::new(BTreeMap::new()),
            content: RwLock::new(None),
            validity: AtomicU8::new(Validity::Valid.as_u8()),
        }
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Permission bits (`0o7777` mask).
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *lock(&self.name) = name.to_string();
    }

    pub fn parent(&self) -> Option<NodeRef> {
        lock(&self.parent).upgrade()
    }

    pub(crate) fn set_parent(&self, parent: Weak<NamespaceNode>) {
        *lock(&self.parent) = parent;
    }

    pub fn content(&self) -> Option<ContentRef> {
        read(&self.content).clone()
    }

    pub fn set_content(&self, content: Option<ContentRef>) -> Option<ContentRef> {
        std::mem::replace(&mut *write(&self.content), content)
    }

    /// Shared access to the child map for enumeration.
    pub fn children(&self) -> RwLockReadGuard<'_, Children> {
        read(&self.children)
    }

    pub(crate) fn children_mut(&self) -> RwLockWriteGuard<'_, Children> {
        write(&self.children)
    }

    pub fn child(&self, name: &str) -> Option<NodeRef> {
        self.children().get(name).cloned()
    }

    /// Snapshot of the current children.
    pub fn child_nodes(&self) -> Vec<NodeRef> {
        self.children().values().cloned().collect()
    }

    pub fn validity(&self) -> Validity {
        Validity::from_u8(self.validity.load(Ordering::Acquire))
    }

    pub fn set_validity(&self, v: Validity) {
        self.validity.store(v.as_u8(), Ordering::Release);
    }

    /// Revalidate a node flagged as stale. Dead nodes stay dead.
    pub fn revalidate(&self) -> bool {
        match self.validity.compare_exchange(
            Validity::NeedsRevalidate.as_u8(),
            Validity::Valid.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(cur) => Validity::from_u8(cur) == Validity::Valid,
        }
    }

    /// Absolute path rebuilt from parent links; best effort under concurrent renames.
    pub fn path(&self) -> String {
        let Some(mut cur) = self.parent() else {
            return "/".to_string();
        };
        let mut parts = vec![self.name()];
        while let Some(parent) = cur.parent() {
            parts.push(cur.name());
            cur = parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }
}

impl Drop for NamespaceNode {
    // Tear subtrees down iteratively; a deep directory chain would otherwise
    // recurse once per level.
    fn drop(&mut self) {
        let children = self.children.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<NodeRef> = std::mem::take(children).into_values().collect();
        while let Some(node) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(node) {
                let children = node.children.get_mut().unwrap_or_else(PoisonError::into_inner);
                pending.extend(std::mem::take(children).into_values());
            }
        }
    }
}

impl fmt::Debug for NamespaceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceNode")
            .field("ino", &self.ino)
            .field("name", &self.name())
            .field("kind", &self.kind)
            .field("validity", &self.validity())
            .finish()
    }
}
