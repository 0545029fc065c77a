//! Utility functions for CLI commands.

use std::path::PathBuf;

use storyline_clusterstore::KvClusterStore;
use storyline_engine::{EngineConfig, FileLock, LockGuard};
use storyline_kv::RedbStore;
use tracing::info;

use crate::Cli;

pub type Store = KvClusterStore<RedbStore>;

/// Loads the engine configuration, applying the global `--db` override.
pub fn get_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let path = match &cli.config {
        Some(p) => Some(PathBuf::from(p)),
        None => EngineConfig::default_path(),
    };
    let mut cfg = match path {
        Some(p) => EngineConfig::load(&p)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = &cli.db {
        cfg.db_path = Some(PathBuf::from(db));
    }
    Ok(cfg)
}

/// Opens the cluster database named by the config, creating it if needed.
pub fn open_store(cfg: &EngineConfig) -> anyhow::Result<Store> {
    let path = cfg
        .db_path()
        .ok_or_else(|| anyhow::anyhow!("cannot determine database path, use --db"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kv = RedbStore::open(&path)?;
    Ok(KvClusterStore::new(kv).with_centroid_width(cfg.centroid_width))
}

/// Takes the run lock. `None` means another run holds it and the command
/// should exit quietly.
///
/// The database allows a single opener, so commands take the lock before
/// [`open_store`] and declare the guard first so the store closes before
/// the lock is released.
pub fn acquire_lock(cfg: &EngineConfig) -> anyhow::Result<Option<LockGuard>> {
    let lock = FileLock::new(cfg.lock_path());
    let guard = lock.acquire()?;
    if guard.is_none() {
        info!(path = %lock.path().display(), "another run holds the lock, exiting");
    }
    Ok(guard)
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(result: &T, as_json: bool) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };
    print!("{}", output);
    Ok(())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}
