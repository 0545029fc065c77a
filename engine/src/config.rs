//! Engine configuration.
//!
//! Stored in ~/.storyline/config.yaml. Every field is optional; missing
//! fields take the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".storyline";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const LOCK_FILE_NAME: &str = "storyline.lock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum cosine similarity to join a cluster or pair with a staged item.
    pub similarity_threshold: f32,

    /// Minimum centroid similarity to merge two clusters.
    /// Must not be lower than `similarity_threshold`.
    pub merge_threshold: f32,

    /// Upper bound on merge passes per run.
    pub max_merge_passes: usize,

    /// Page size when fetching unclustered items.
    pub fetch_limit: usize,

    /// Width persisted centroids are normalized to.
    pub centroid_width: usize,

    /// Clusters not updated for this many days are marked OLD.
    pub stale_after_days: i64,

    /// Attempts per pipeline phase.
    pub max_retries: u32,

    /// Cross-process lock marker (default: $TMPDIR/storyline.lock).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_path: Option<PathBuf>,

    /// Cluster database (default: ~/.storyline/data/clusters.redb).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.82,
            merge_threshold: 0.90,
            max_merge_passes: 10,
            fetch_limit: 1000,
            centroid_width: 768,
            stale_after_days: 3,
            max_retries: 3,
            lock_path: None,
            db_path: None,
        }
    }
}

impl EngineConfig {
    /// Gets the default config file path (~/.storyline/config.yaml).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
    }

    /// Loads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let cfg = match std::fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                EngineError::InvalidConfig(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(EngineError::InvalidConfig(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks thresholds and sizes.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_thresholds(self.similarity_threshold, self.merge_threshold)?;
        if self.fetch_limit == 0 || self.centroid_width == 0 {
            return Err(EngineError::InvalidConfig(
                "fetch_limit and centroid_width must be positive".into(),
            ));
        }
        if self.stale_after_days < 0 {
            return Err(EngineError::InvalidConfig(
                "stale_after_days must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn stale_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.stale_after_days)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(LOCK_FILE_NAME))
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join("data").join("clusters.redb"))
        })
    }
}

/// Both thresholds must lie in (0, 1] and merging must be at least as
/// strict as joining.
pub(crate) fn check_thresholds(similarity: f32, merge: f32) -> Result<(), EngineError> {
    if !(similarity > 0.0 && similarity <= 1.0) {
        return Err(EngineError::InvalidConfig(format!(
            "similarity_threshold must be in (0, 1], got {similarity}"
        )));
    }
    if !(merge >= similarity && merge <= 1.0) {
        return Err(EngineError::InvalidConfig(format!(
            "merge_threshold must be in [{similarity}, 1], got {merge}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.similarity_threshold, 0.82);
        assert_eq!(cfg.merge_threshold, 0.90);
        assert_eq!(cfg.stale_window(), chrono::Duration::days(3));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "similarity_threshold: 0.7\nfetch_limit: 50\n").unwrap();

        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.similarity_threshold, 0.7);
        assert_eq!(cfg.fetch_limit, 50);
        assert_eq!(cfg.merge_threshold, 0.90);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_merge_below_similarity_is_rejected() {
        let cfg = EngineConfig {
            similarity_threshold: 0.9,
            merge_threshold: 0.8,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "similarity_threshold: [nope").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
