use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PREFIX: &str = "auto-backup-";
const EXTENSION: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A snapshot of the primary document found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    /// Second-resolution local time embedded in the file name.
    pub taken_at: NaiveDateTime,
    /// Same-second disambiguator (`-N` suffix), 0 when absent.
    pub sequence: u32,
}

impl BackupInfo {
    /// Parse a snapshot file name, `None` for anything that is not one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;

        // "YYYYMMDD-HHMMSS" is 15 bytes; anything after is "-N".
        if stem.len() < 15 || !stem.is_char_boundary(15) {
            return None;
        }
        let (stamp, rest) = stem.split_at(15);
        let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let sequence = match rest {
            "" => 0,
            _ => rest.strip_prefix('-')?.parse().ok()?,
        };

        Some(Self {
            path: path.to_path_buf(),
            taken_at,
            sequence,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `auto-backup-YYYYMMDD-HHMMSS.json`, or `...-HHMMSS-N.json` for `sequence > 0`.
pub fn backup_file_name(taken_at: &NaiveDateTime, sequence: u32) -> String {
    let stamp = taken_at.format(TIMESTAMP_FORMAT);
    if sequence == 0 {
        format!("{}{}{}", PREFIX, stamp, EXTENSION)
    } else {
        format!("{}{}-{}{}", PREFIX, stamp, sequence, EXTENSION)
    }
}

/// Write `contents` under a fresh snapshot name in `dir`.
///
/// Never overwrites: an existing name bumps the sequence suffix.
pub fn write_new(dir: &Path, taken_at: &NaiveDateTime, contents: &[u8]) -> io::Result<PathBuf> {
    use std::io::Write;

    fs::create_dir_all(dir)?;
    let mut sequence = 0;
    loop {
        let path = dir.join(backup_file_name(taken_at, sequence));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(contents)?;
                file.sync_all()?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => sequence += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Snapshots in `dir`, oldest first. A missing directory has none.
pub fn list(dir: &Path) -> io::Result<Vec<BackupInfo>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(info) = BackupInfo::from_path(&entry.path()) {
            backups.push(info);
        }
    }
    backups.sort_by(|a, b| (a.taken_at, a.sequence).cmp(&(b.taken_at, b.sequence)));
    Ok(backups)
}
