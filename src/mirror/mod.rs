//! Per-service `KEY=VALUE` records, kept beside the primary store.
//!
//! Each record is a self-contained projection of one [`ServiceEntry`] and is
//! also the `EnvironmentFile` the unit reads at start. Records survive loss of
//! `services.json` and are what the recovery engine rebuilds from.
//!
//! Layout, one assignment per line, split on the first `=`:
//!
//! ```text
//! COMMAND=python -m http.server
//! WORKING_DIR=/home/me/site
//! PORT=8000
//! DEBUG=1
//! ```

use crate::error::{Error, Result};
use crate::registry::{ServiceEntry, PORT_ENV_KEY};
use crate::store::atomic_write;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const COMMAND_KEY: &str = "COMMAND";
const WORKING_DIR_KEY: &str = "WORKING_DIR";
const RECORD_EXTENSION: &str = "env";

/// Fields read back from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    pub command: String,
    pub port: u16,
    /// Empty when the record carried no `WORKING_DIR`
    pub working_dir: String,
    /// Every non-special key, plus `PORT`
    pub env: BTreeMap<String, String>,
}

impl MirrorRecord {
    /// Rebuild an entry. `enabled` is not mirrored and must come from the
    /// init system.
    pub fn into_entry(self, enabled: bool) -> ServiceEntry {
        let mut entry = ServiceEntry::new(self.command, self.port, self.working_dir).with_env(self.env);
        entry.enabled = enabled;
        entry
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentMirror {
    dir: PathBuf,
}

impl EnvironmentMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).is_file()
    }

    /// Render `entry` and atomically replace the record for `name`.
    pub fn write(&self, name: &str, entry: &ServiceEntry) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(name);
        atomic_write(&path, render(entry).as_bytes())?;
        tracing::debug!("Wrote environment record {}", path.display());
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<MirrorRecord> {
        let path = self.record_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::RecordNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        parse(&contents).map_err(|reason| Error::MalformedRecord { path, reason })
    }

    /// Remove the record for `name`. Removing a missing record is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every service with a record, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Serialize an entry: `COMMAND`, `WORKING_DIR` (if set), `PORT`, then the
/// remaining env keys in order.
pub fn render(entry: &ServiceEntry) -> String {
    let mut out = String::new();
    push_line(&mut out, COMMAND_KEY, &entry.command);
    if !entry.working_dir.is_empty() {
        push_line(&mut out, WORKING_DIR_KEY, &entry.working_dir);
    }
    push_line(&mut out, PORT_ENV_KEY, &entry.port.to_string());
    for (key, value) in &entry.env {
        if matches!(key.as_str(), COMMAND_KEY | WORKING_DIR_KEY | PORT_ENV_KEY) {
            continue;
        }
        push_line(&mut out, key, value);
    }
    out
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push('\n');
}

/// Parse record text. The error is a human-readable reason.
pub fn parse(contents: &str) -> std::result::Result<MirrorRecord, String> {
    let mut command = None;
    let mut working_dir = String::new();
    let mut port = None;
    let mut env = BTreeMap::new();

    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {} is not KEY=VALUE", index + 1))?;
        let key = key.trim();

        match key {
            COMMAND_KEY => command = Some(value.to_string()),
            WORKING_DIR_KEY => working_dir = value.to_string(),
            PORT_ENV_KEY => {
                let parsed = value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| format!("PORT '{}' is not a valid port number", value))?;
                port = Some(parsed);
            }
            _ => {
                env.insert(key.to_string(), value.to_string());
            }
        }
    }

    let command = command.ok_or_else(|| "missing COMMAND".to_string())?;
    let port = port.ok_or_else(|| "missing PORT".to_string())?;
    env.insert(PORT_ENV_KEY.to_string(), port.to_string());

    Ok(MirrorRecord {
        command,
        port,
        working_dir,
        env,
    })
}
