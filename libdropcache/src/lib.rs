//! Selective page cache eviction.
//!
//! Given a node of a namespace tree, drop the clean cached pages of that node and
//! of everything beneath it, as a targeted alternative to dropping every cache in
//! the system. The tree may be modified concurrently while a walk is running;
//! each directory is locked only while its own children are captured.
#[macro_use]
extern crate log;

pub mod config;
pub mod content;
pub mod control;
pub mod error;
pub mod invalidate;
pub mod namespace;
pub mod resolve;
pub mod service;
mod util;
pub mod walk;

pub use content::page_cache::PageCache;
pub use content::{ContentCache, ContentRef, LifecycleState, WHOLE_FILE};
pub use control::{ControlHandler, ControlRegistry, DROP_CACHES_PATH, DropCachesPath, Registration};
pub use error::{DropCacheError, Result};
pub use invalidate::{CacheInvalidator, NodeOutcome};
pub use namespace::{Namespace, NamespaceNode, NodeKind, NodeRef, Validity};
pub use resolve::namespace::NamespaceResolver;
pub use resolve::{Credentials, LookupFlags, PathResolver};
pub use service::{InvalidationReport, InvalidationService};
pub use walk::TreeWalker;
