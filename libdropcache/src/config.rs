use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::control::DROP_CACHES_PATH;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // name the control entry is registered under
    pub endpoint: String,
    // only admins may write the entry
    pub require_admin: bool,
    // env_logger filter used when RUST_LOG is unset
    pub log_level: String,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Stay on the device of the resolved path when mirroring a host tree.
    pub one_file_system: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DROP_CACHES_PATH.to_string(),
            require_admin: true,
            log_level: "info".to_string(),
            host: HostConfig::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            one_file_system: true,
        }
    }
}

impl Config {
    /// Permission bits of the control entry.
    pub fn endpoint_mode(&self) -> u32 {
        if self.require_admin { 0o644 } else { 0o666 }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
