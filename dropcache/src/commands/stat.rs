use anyhow::Result;
use libdropcache::config::{Config, HostConfig};
use libdropcache::resolve::host::HostResolver;
use libdropcache::{NodeKind, NodeRef, TreeWalker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cached page count of every regular file below `root`, labelled relative to it.
fn cached_files(root: &NodeRef) -> Vec<(String, u64)> {
    let base = root.path();
    let mut files = Vec::new();
    TreeWalker::new().walk(root, |node| {
        if node.kind() != NodeKind::Regular {
            return;
        }
        let Some(content) = node.content() else {
            return;
        };
        let label = if Arc::ptr_eq(root, node) {
            ".".to_string()
        } else {
            let path = node.path();
            path.strip_prefix(base.as_str())
                .unwrap_or(&path)
                .trim_start_matches('/')
                .to_string()
        };
        files.push((label, content.cached_pages()));
    });
    files
}

fn collect(host: HostConfig, path: &Path) -> Result<Vec<(String, u64)>> {
    let root = HostResolver::new(host).resolve_path(path)?;
    Ok(cached_files(&root))
}

pub async fn run(cfg: &Config, path: PathBuf) -> Result<()> {
    let host = cfg.host;
    let files = tokio::task::spawn_blocking(move || collect(host, &path)).await??;

    let mut total = 0;
    for (label, pages) in &files {
        println!("{pages:>10} {label}");
        total += pages;
    }
    println!("{total:>10} total ({} files)", files.len());
    Ok(())
}
