use crate::error::{Error, Result};
use crate::registry::PortRange;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables for the host integration, read from `settings.yaml`.
///
/// Every field has a default, so the file is optional and may be partial:
///
/// ```yaml
/// unit_prefix: svcreg
/// user_scope: true
/// settle_delay_ms: 1000
/// command_timeout_secs: 10
/// default_range:
///   start: 8000
///   end: 9000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Units are named `<unit_prefix>@<service>.service`
    pub unit_prefix: String,

    /// Use `systemctl --user` / `journalctl --user`
    pub user_scope: bool,

    /// Wait after a successful start before detecting the bound port
    pub settle_delay_ms: u64,

    /// Timeout for each controller subprocess
    pub command_timeout_secs: u64,

    /// Range installed as "default" in a fresh or recovered store
    pub default_range: PortRange,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unit_prefix: "svcreg".to_string(),
            user_scope: true,
            settle_delay_ms: 1000,
            command_timeout_secs: 10,
            default_range: PortRange::new(8000, 9000),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read settings file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        let settings = Self::parse(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML string. Empty input yields defaults.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_prefix.is_empty()
            || !self
                .unit_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Config(format!(
                "unit_prefix '{}' must be non-empty and contain only alphanumerics, '-' or '_'",
                self.unit_prefix
            )));
        }
        if !self.default_range.is_valid() {
            return Err(Error::InvalidRange {
                name: "default".to_string(),
                start: self.default_range.start,
                end: self.default_range.end,
            });
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
