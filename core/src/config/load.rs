use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use super::types::{EngineConfig, StoreConfig};
use crate::state::{FileProgressStore, ProgressStore};

/// Get the default taskweave data directory: ~/.taskweave
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taskweave"))
}

pub fn load_default() -> anyhow::Result<EngineConfig> {
    // Priority 1: ~/.taskweave/config.toml (highest)
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./taskweave.toml (current directory)
    let local_config = Path::new("taskweave.toml");

    let mut cfg = if user_config.exists() {
        read_config(&user_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        EngineConfig::default()
    };

    if is_unset(&cfg.store.directory) {
        cfg.store.directory = Some(data_dir.join("sessions").to_string_lossy().to_string());
    }
    if is_unset(&cfg.logging.directory) {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    cfg.validate()?;
    Ok(cfg)
}

/// Load a config file without consulting the default locations or the environment.
pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<EngineConfig> {
    let cfg = read_config(path.as_ref())?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.as_ref().display()))?;
    Ok(cfg)
}

fn read_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str::<EngineConfig>(&s)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

pub(crate) fn apply_env_overrides(
    cfg: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("TASKWEAVE_MAX_PARALLEL") {
        cfg.coordinator.max_parallel = v
            .trim()
            .parse::<usize>()
            .with_context(|| format!("TASKWEAVE_MAX_PARALLEL is not a number: {v}"))?;
    }
    if let Some(v) = var("TASKWEAVE_STORE_DIR") {
        cfg.store.directory = Some(v);
    }
    if let Some(v) = var("TASKWEAVE_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    Ok(())
}

/// Open the file-backed progress store described by `cfg`.
///
/// Returns `None` when persistence is disabled. Expired sessions are pruned
/// before the store is handed out.
pub async fn open_store(cfg: &StoreConfig) -> anyhow::Result<Option<Arc<dyn ProgressStore>>> {
    if !cfg.enabled {
        return Ok(None);
    }

    let dir = match cfg
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(d) => PathBuf::from(d),
        None => get_data_dir()?.join("sessions"),
    };

    let store = FileProgressStore::open(&dir)
        .await
        .with_context(|| format!("failed to open progress store at {}", dir.display()))?;

    if cfg.retention_days > 0 {
        let max_age = chrono::Duration::days(i64::from(cfg.retention_days));
        match store.delete_sessions_older_than(max_age).await {
            Ok(0) => {}
            Ok(pruned) => tracing::info!(pruned, dir = %dir.display(), "pruned expired sessions"),
            Err(e) => tracing::warn!(error = %e, "failed to prune expired sessions"),
        }
    }

    let store: Arc<dyn ProgressStore> = Arc::new(store);
    Ok(Some(store))
}
