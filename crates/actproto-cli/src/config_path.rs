use actproto_core::config::CONFIG_FILE;
use actproto_core::ProtocolConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Resolve which config file applies.
///
/// Priority:
/// 1. `--config` flag / `ACTPROTO_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.actproto.yaml`
/// 3. None: built-in defaults
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let cwd = std::env::current_dir().ok()?;
    find_upward(&cwd)
}

pub fn find_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Load and validate the effective config.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ProtocolConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            ProtocolConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(ProtocolConfig::default()),
    }
}
