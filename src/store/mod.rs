//! The primary JSON document and its snapshots.
//!
//! [`ConfigStore`] is the only writer of `services.json`. Every save first
//! snapshots the existing document if it still holds any service, so no
//! write can destroy definitions without leaving a recoverable copy behind.
//! This holds even when a hand edit broke the schema of one entry: the
//! service map is then judged on the raw JSON.

mod backup;

pub use backup::{backup_file_name, BackupInfo};

use crate::config::StorePaths;
use crate::error::{Error, Result};
use crate::registry::{PortRange, Registry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Range installed as `"default"` when a store is first created.
pub const DEFAULT_PORT_RANGE: PortRange = PortRange {
    start: 8000,
    end: 9000,
};

/// What is currently on disk at the primary path.
enum Existing {
    Missing,
    Parsed(Registry),
    /// Not a valid registry. `holds_services` is set when the raw JSON still
    /// has a non-empty `services` object.
    Corrupt { reason: String, holds_services: bool },
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: StorePaths,
    default_range: PortRange,
}

impl ConfigStore {
    pub fn new(paths: StorePaths) -> Self {
        Self {
            paths,
            default_range: DEFAULT_PORT_RANGE,
        }
    }

    /// Use `range` as the `"default"` range of a freshly initialised store.
    pub fn with_default_range(mut self, range: PortRange) -> Self {
        self.default_range = range;
        self
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn default_range(&self) -> PortRange {
        self.default_range
    }

    /// Whether the primary document is present (parseable or not).
    pub fn exists(&self) -> bool {
        self.paths.store_file.exists()
    }

    /// Load the registry.
    ///
    /// A missing document is initialised with an empty service map and the
    /// default range, persisted, then returned. A document that exists but
    /// does not parse is [`Error::CorruptStore`].
    pub fn load(&self) -> Result<Registry> {
        match self.read_existing()? {
            Existing::Parsed(registry) => Ok(registry),
            Existing::Corrupt { reason, .. } => Err(Error::CorruptStore {
                path: self.paths.store_file.clone(),
                reason,
            }),
            Existing::Missing => {
                let registry = Registry::with_default_range(self.default_range);
                self.save(&registry)?;
                tracing::info!(
                    "Initialized service store at {}",
                    self.paths.store_file.display()
                );
                Ok(registry)
            }
        }
    }

    /// Overwrite the primary document with `registry`.
    ///
    /// If the current document holds at least one service it is snapshotted
    /// first and the snapshot path is returned. A document that is not even
    /// JSON with a service map is overwritten without one; callers that must
    /// keep it use [`ConfigStore::preserve_corrupt`] beforehand.
    pub fn save(&self, registry: &Registry) -> Result<Option<PathBuf>> {
        let snapshot = match self.read_existing()? {
            Existing::Parsed(current) if !current.services.is_empty() => self.backup()?,
            Existing::Corrupt {
                reason,
                holds_services: true,
            } => {
                tracing::warn!(
                    "Store {} does not match the registry schema ({}); snapshotting before overwrite",
                    self.paths.store_file.display(),
                    reason
                );
                self.backup()?
            }
            Existing::Corrupt { reason, .. } => {
                tracing::warn!(
                    "Overwriting unparsable store {} without a backup: {}",
                    self.paths.store_file.display(),
                    reason
                );
                None
            }
            _ => None,
        };

        let contents = serde_json::to_string_pretty(registry)?;
        if let Some(parent) = self.paths.store_file.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&self.paths.store_file, contents.as_bytes())?;
        Ok(snapshot)
    }

    /// Copy the primary document verbatim into the backup directory.
    ///
    /// Returns `None` when there is no document to protect.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        let contents = match fs::read(&self.paths.store_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let now = chrono::Local::now().naive_local();
        let path = backup::write_new(&self.paths.backup_dir, &now, &contents)?;
        tracing::info!("Backed up service store to {}", path.display());
        Ok(Some(path))
    }

    /// Copy a corrupt document that [`ConfigStore::save`] would not snapshot.
    ///
    /// Returns `None` when the document is missing, valid, or will be
    /// snapshotted by the next save anyway.
    pub fn preserve_corrupt(&self) -> Result<Option<PathBuf>> {
        match self.read_existing()? {
            Existing::Corrupt {
                holds_services: false,
                ..
            } => self.backup(),
            _ => Ok(None),
        }
    }

    /// Snapshots, oldest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        Ok(backup::list(&self.paths.backup_dir)?)
    }

    pub fn latest_backup(&self) -> Result<Option<BackupInfo>> {
        Ok(self.list_backups()?.pop())
    }

    /// Write the current registry to an arbitrary file.
    pub fn export_to(&self, path: &Path) -> Result<()> {
        let registry = self.load()?;
        let contents = serde_json::to_string_pretty(&registry)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        atomic_write(path, contents.as_bytes())?;
        Ok(())
    }

    /// Parse a snapshot or export file.
    pub fn read_snapshot(path: &Path) -> Result<Registry> {
        let invalid = |reason: String| Error::InvalidBackup {
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))
    }

    fn read_existing(&self) -> Result<Existing> {
        let contents = match fs::read_to_string(&self.paths.store_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Existing::Missing),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Ok(Existing::Corrupt {
                    reason: e.to_string(),
                    holds_services: false,
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(match serde_json::from_str::<Registry>(&contents) {
            Ok(registry) => Existing::Parsed(registry),
            Err(e) => Existing::Corrupt {
                reason: e.to_string(),
                holds_services: raw_holds_services(&contents),
            },
        })
    }
}

fn raw_holds_services(contents: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(contents)
        .ok()
        .and_then(|value| {
            value
                .get("services")
                .and_then(|services| services.as_object())
                .map(|services| !services.is_empty())
        })
        .unwrap_or(false)
}

/// Write through a temp file and rename, so readers never see a torn file.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let temp_path = temp_path_for(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    // Ensure data is on disk before the rename makes it visible
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceEntry;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> ConfigStore {
        ConfigStore::new(StorePaths::from_root(temp.path()))
    }

    fn registry_with(name: &str, port: u16) -> Registry {
        let mut registry = Registry::with_default_range(DEFAULT_PORT_RANGE);
        registry
            .services
            .insert(name.to_string(), ServiceEntry::new("run", port, "/srv"));
        registry
    }

    #[test]
    fn load_initialises_missing_store() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(!store.exists());

        let registry = store.load().unwrap();
        assert!(registry.services.is_empty());
        assert_eq!(registry.port_ranges["default"], PortRange::new(8000, 9000));
        assert!(store.exists());
        // Initialising never snapshots: there was nothing to protect
        assert!(store.list_backups().unwrap().is_empty());
    }

    #[test]
    fn custom_default_range() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp).with_default_range(PortRange::new(3000, 3100));
        assert_eq!(
            store.load().unwrap().port_ranges["default"],
            PortRange::new(3000, 3100)
        );
    }

    #[test]
    fn unparsable_store_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::write(&store.paths().store_file, "{ not json").unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptStore { .. })));

        fs::write(
            &store.paths().store_file,
            r#"{"services": {"x": {"command": "run", "port": "eighty"}}}"#,
        )
        .unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptStore { .. })));
    }

    #[test]
    fn save_snapshots_store_with_services() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&registry_with("test-service", 8000)).unwrap();
        let before = fs::read_to_string(&store.paths().store_file).unwrap();

        let snapshot = store.save(&Registry::default()).unwrap();

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(snapshot.as_deref(), Some(backups[0].path.as_path()));
        let saved: Registry =
            serde_json::from_str(&fs::read_to_string(&backups[0].path).unwrap()).unwrap();
        let original: Registry = serde_json::from_str(&before).unwrap();
        assert_eq!(saved, original);
        assert!(saved.services.contains_key("test-service"));
        assert!(store.load().unwrap().services.is_empty());
    }

    #[test]
    fn save_over_empty_store_does_not_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.load().unwrap();
        assert!(store.save(&registry_with("a", 8000)).unwrap().is_none());
        assert!(store.list_backups().unwrap().is_empty());
    }

    #[test]
    fn save_over_corrupt_store_proceeds() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::write(&store.paths().store_file, "garbage").unwrap();

        assert!(store.save(&registry_with("a", 8000)).unwrap().is_none());
        assert!(store.list_backups().unwrap().is_empty());
        assert!(store.load().unwrap().services.contains_key("a"));
    }

    #[test]
    fn save_snapshots_schema_broken_store_that_still_has_services() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let hand_edited = r#"{"services": {
            "keep": {"command": "run", "port": 8000},
            "b": {"command": "run", "port": "8001"}
        }}"#;
        fs::write(&store.paths().store_file, hand_edited).unwrap();

        let snapshot = store.save(&Registry::default()).unwrap().unwrap();
        assert_eq!(fs::read_to_string(snapshot).unwrap(), hand_edited);
        assert_eq!(store.list_backups().unwrap().len(), 1);
        // Nothing left for preserve_corrupt to do
        assert!(store.preserve_corrupt().unwrap().is_none());
    }

    #[test]
    fn preserve_corrupt_copies_unparsable_store() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.preserve_corrupt().unwrap().is_none());

        fs::write(&store.paths().store_file, "{ truncated").unwrap();
        let copy = store.preserve_corrupt().unwrap().unwrap();
        assert_eq!(fs::read_to_string(copy).unwrap(), "{ truncated");

        store.save(&registry_with("a", 8000)).unwrap();
        assert!(store.preserve_corrupt().unwrap().is_none());
    }

    #[test]
    fn backup_without_store_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp).backup().unwrap().is_none());
    }

    #[test]
    fn repeated_backups_are_append_only() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&registry_with("a", 8000)).unwrap();
        let first = store.backup().unwrap().unwrap();
        let second = store.backup().unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list_backups().unwrap().len(), 2);
        assert_eq!(store.latest_backup().unwrap().unwrap().path, second);
    }

    #[test]
    fn export_and_read_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&registry_with("web", 8123)).unwrap();

        let out = temp.path().join("exports/manual.json");
        store.export_to(&out).unwrap();
        let read = ConfigStore::read_snapshot(&out).unwrap();
        assert_eq!(read.services["web"].port, 8123);
    }

    #[test]
    fn read_snapshot_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            ConfigStore::read_snapshot(&path),
            Err(Error::InvalidBackup { .. })
        ));
        assert!(matches!(
            ConfigStore::read_snapshot(&temp.path().join("missing.json")),
            Err(Error::InvalidBackup { .. })
        ));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!temp.path().join("doc.json.tmp").exists());
    }
}
