//! Entry point of the invalidation engine.

use std::fmt;
use std::time::Instant;

use crate::error::Result;
use crate::invalidate::{CacheInvalidator, NodeOutcome};
use crate::namespace::NodeRef;
use crate::resolve::{Credentials, PathResolver};
use crate::walk::TreeWalker;

/// Tally of one invalidation request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub visited: u64,
    /// Nodes whose content had clean pages discarded.
    pub discarded: u64,
    pub pages_dropped: u64,
    pub no_content: u64,
    pub transitional: u64,
    pub empty: u64,
}

impl InvalidationReport {
    fn record(&mut self, outcome: NodeOutcome) {
        self.visited += 1;
        match outcome {
            NodeOutcome::NoContent => self.no_content += 1,
            NodeOutcome::Transitional(_) => self.transitional += 1,
            NodeOutcome::Empty => self.empty += 1,
            NodeOutcome::Discarded(pages) => {
                self.discarded += 1;
                self.pages_dropped += pages;
            }
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: &InvalidationReport) {
        self.visited += other.visited;
        self.discarded += other.discarded;
        self.pages_dropped += other.pages_dropped;
        self.no_content += other.no_content;
        self.transitional += other.transitional;
        self.empty += other.empty;
    }
}

impl fmt::Display for InvalidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visited {} nodes, dropped {} pages from {} files ({} empty, {} in transition, {} without content)",
            self.visited,
            self.pages_dropped,
            self.discarded,
            self.empty,
            self.transitional,
            self.no_content
        )
    }
}

/// Drops clean cached pages for a node and everything beneath it.
///
/// Requests run on the calling thread. Overlapping requests may run in parallel
/// on separate threads; a page dropped twice is simply not there the second time.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvalidationService {
    walker: TreeWalker,
    invalidator: CacheInvalidator,
}

impl InvalidationService {
    pub fn new() -> Self {
        Self {
            walker: TreeWalker::new(),
            invalidator: CacheInvalidator::new(),
        }
    }

    /// Invalidate the subtree rooted at `root`. Never fails once a live node is
    /// in hand; nodes with nothing to drop are skipped silently.
    pub fn invalidate(&self, root: &NodeRef) -> Result<InvalidationReport> {
        let start = Instant::now();
        let mut report = InvalidationReport::default();
        self.walker.walk(root, |node| {
            report.record(self.invalidator.invalidate_node(node));
        });
        debug!(
            "invalidated ino {} in {:?}: {report}",
            root.ino(),
            start.elapsed()
        );
        Ok(report)
    }

    /// Resolve `path` and invalidate the subtree found there. Only resolution
    /// errors are returned.
    pub fn invalidate_path<R>(
        &self,
        resolver: &R,
        creds: &Credentials,
        path: &str,
    ) -> Result<InvalidationReport>
    where
        R: PathResolver + ?Sized,
    {
        let root = resolver.resolve(creds, path)?;
        self.invalidate(&root)
    }
}
