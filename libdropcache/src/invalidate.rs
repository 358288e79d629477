//! Per-node invalidation.

use crate::content::{LifecycleState, WHOLE_FILE};
use crate::namespace::NamespaceNode;

/// What happened to a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Special file without cacheable content.
    NoContent,
    /// Content is being set up or torn down by its filesystem.
    Transitional(LifecycleState),
    /// Nothing cached.
    Empty,
    /// Clean pages were discarded; dirty and referenced pages stay.
    Discarded(u64),
}

/// Decides whether one node's content object can be dropped and drops it.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheInvalidator;

impl CacheInvalidator {
    pub fn new() -> Self {
        Self
    }

    pub fn invalidate_node(&self, node: &NamespaceNode) -> NodeOutcome {
        let Some(content) = node.content() else {
            return NodeOutcome::NoContent;
        };
        let state = content.state();
        if state.is_transitional() {
            trace!("skip ino {}: content is {state}", node.ino());
            return NodeOutcome::Transitional(state);
        }
        if content.cached_pages() == 0 {
            return NodeOutcome::Empty;
        }
        let dropped = content.discard_clean(0, WHOLE_FILE);
        trace!("ino {}: dropped {dropped} clean pages", node.ino());
        NodeOutcome::Discarded(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentCache;
    use crate::content::page_cache::{DEFAULT_PAGE_SIZE, PageCache};
    use crate::namespace::{Namespace, NodeKind};
    use std::sync::Arc;

    #[test]
    fn test_skip_rules() {
        let ns = Namespace::new();
        let inv = CacheInvalidator::new();

        let sock = ns.create_node("/sock", NodeKind::Socket, None).unwrap();
        assert_eq!(inv.invalidate_node(&sock), NodeOutcome::NoContent);

        let empty = ns
            .create_file("/empty", Some(Arc::new(PageCache::new())))
            .unwrap();
        assert_eq!(inv.invalidate_node(&empty), NodeOutcome::Empty);

        let cache = Arc::new(PageCache::new());
        cache.fill(0, 4 * DEFAULT_PAGE_SIZE);
        cache.set_state(LifecycleState::Freeing);
        let freeing = ns.create_file("/freeing", Some(cache.clone())).unwrap();
        assert_eq!(
            inv.invalidate_node(&freeing),
            NodeOutcome::Transitional(LifecycleState::Freeing)
        );
        assert_eq!(cache.cached_pages(), 4);
    }

    #[test]
    fn test_discard_is_idempotent() {
        let ns = Namespace::new();
        let inv = CacheInvalidator::new();
        let cache = Arc::new(PageCache::new());
        cache.fill(0, 10 * DEFAULT_PAGE_SIZE);
        cache.write(10 * DEFAULT_PAGE_SIZE, 2 * DEFAULT_PAGE_SIZE);
        let file = ns.create_file("/a/file", Some(cache.clone())).unwrap();

        assert_eq!(inv.invalidate_node(&file), NodeOutcome::Discarded(10));
        assert_eq!(cache.clean_pages(), 0);
        assert_eq!(cache.dirty_pages(), 2);

        // only dirty pages remain, so the second pass drops nothing
        assert_eq!(inv.invalidate_node(&file), NodeOutcome::Discarded(0));
        assert_eq!(cache.dirty_pages(), 2);
    }
}
