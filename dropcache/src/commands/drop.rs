use anyhow::{Result, bail};
use libdropcache::config::Config;
use libdropcache::resolve::host::HostResolver;
use libdropcache::{
    ControlRegistry, Credentials, DropCacheError, DropCachesPath, InvalidationService,
};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

/// Register the control entry for the lifetime of the command and write every
/// path to it, as a user would write to the sysctl. Paths are handled in
/// parallel on the blocking pool.
pub async fn run(cfg: &Config, paths: Vec<PathBuf>) -> Result<()> {
    let registry = ControlRegistry::new();
    let handler = DropCachesPath::new(HostResolver::new(cfg.host));
    let _registration =
        registry.register(&cfg.endpoint, Arc::new(handler), cfg.endpoint_mode())?;

    let total = paths.len();
    let failed = write_paths(&registry, cfg, Credentials::current(), paths).await;
    if failed > 0 {
        bail!("{failed} of {total} paths failed");
    }
    Ok(())
}

/// A path the control entry cannot carry, since its writes are UTF-8 text.
/// Resolved on the host directly under the same access rule as the entry.
fn drop_raw_path(cfg: &Config, creds: Credentials, path: PathBuf) -> libdropcache::Result<()> {
    if cfg.require_admin && !creds.admin {
        return Err(DropCacheError::PermissionDenied(cfg.endpoint.clone()));
    }
    let resolver = HostResolver::new(cfg.host);
    let root = resolver.resolve_path(&path)?;
    let report = InvalidationService::new().invalidate(&root)?;
    info!("drop_caches_path {path:?}: {report}");
    Ok(())
}

/// Issue one request per path and report each outcome. Returns the number of
/// paths that failed, including requests that panicked.
async fn write_paths(
    registry: &ControlRegistry,
    cfg: &Config,
    creds: Credentials,
    paths: Vec<PathBuf>,
) -> usize {
    let mut requests = Vec::with_capacity(paths.len());
    for path in paths {
        let label = path.display().to_string();
        let task = match path.to_str() {
            Some(text) => {
                let registry = registry.clone();
                let endpoint = cfg.endpoint.clone();
                let mut buf = format!("{text}\n").into_bytes();
                tokio::task::spawn_blocking(move || {
                    registry.write(&endpoint, &creds, &mut buf).map(|_| ())
                })
            }
            None => {
                let cfg = cfg.clone();
                tokio::task::spawn_blocking(move || drop_raw_path(&cfg, creds, path))
            }
        };
        requests.push((label, task));
    }

    let mut failed = 0;
    for (label, task) in requests {
        let res = match task.await {
            Ok(res) => res,
            Err(e) => {
                error!("drop caches below {label} aborted: {e}");
                println!("[dropcache] {label}: aborted");
                failed += 1;
                continue;
            }
        };
        match res {
            Ok(()) => {
                info!("dropped caches below {label}");
                println!("[dropcache] {label}: ok");
            }
            Err(e) => {
                error!("drop caches below {label} failed: {e}");
                println!("[dropcache] {label}: {e}");
                failed += 1;
            }
        }
    }
    failed
}
