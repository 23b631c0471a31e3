use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the svcreg home directory.
pub const HOME_ENV_VAR: &str = "SVCREG_HOME";

/// Filesystem layout of a svcreg home directory.
///
/// Every component receives its paths from here; nothing reads a global
/// location on its own, so tests can point a whole registry at a temp dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub root: PathBuf,
    /// Primary JSON document (`services.json`)
    pub store_file: PathBuf,
    /// One `<name>.env` record per service
    pub env_dir: PathBuf,
    /// Timestamped snapshots of the primary document
    pub backup_dir: PathBuf,
    /// Optional `settings.yaml`
    pub settings_file: PathBuf,
}

impl StorePaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            store_file: root.join("services.json"),
            env_dir: root.join("env"),
            backup_dir: root.join("backups"),
            settings_file: root.join("settings.yaml"),
            root,
        }
    }

    /// Resolve the home directory.
    ///
    /// Priority:
    /// 1. explicit override (the `--home` flag)
    /// 2. `SVCREG_HOME` env var
    /// 3. `<config dir>/svcreg` (e.g. `~/.config/svcreg`)
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::from_root(dir));
        }

        if let Ok(dir) = std::env::var(HOME_ENV_VAR) {
            if !dir.trim().is_empty() {
                return Ok(Self::from_root(dir));
            }
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(Self::from_root(config_dir.join("svcreg")))
    }

    /// Create the root, env and backup directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.root, &self.env_dir, &self.backup_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// The user's home directory, used as the default working directory.
pub fn default_working_dir() -> String {
    dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}
