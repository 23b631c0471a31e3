use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key under which every service's port is mirrored into its environment.
pub const PORT_ENV_KEY: &str = "PORT";

/// Name of the range installed in a fresh store.
pub const DEFAULT_RANGE: &str = "default";

/// One managed process definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Shell command line to execute
    pub command: String,

    /// Last known/assigned listening port
    pub port: u16,

    /// Working directory (absolute path)
    #[serde(default)]
    pub working_dir: String,

    /// Whether the unit should start at boot
    #[serde(default)]
    pub enabled: bool,

    /// Extra environment; always carries `PORT` mirroring `port`
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServiceEntry {
    pub fn new(command: impl Into<String>, port: u16, working_dir: impl Into<String>) -> Self {
        let mut entry = Self {
            command: command.into(),
            port,
            working_dir: working_dir.into(),
            enabled: false,
            env: BTreeMap::new(),
        };
        entry.sync_port_env();
        entry
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self.sync_port_env();
        self
    }

    /// Change the port and keep `env["PORT"]` in step.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
        self.sync_port_env();
    }

    /// Re-establish `env["PORT"] == port.to_string()`.
    pub fn sync_port_env(&mut self) {
        self.env
            .insert(PORT_ENV_KEY.to_string(), self.port.to_string());
    }

    pub fn port_env_in_sync(&self) -> bool {
        self.env.get(PORT_ENV_KEY) == Some(&self.port.to_string())
    }
}

/// Named, inclusive interval of ports available for auto-assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Ranges must span more than one port (`end > start`).
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory form of the primary store document.
///
/// Maps are ordered so the pretty-printed JSON is stable across saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,

    #[serde(default)]
    pub port_ranges: BTreeMap<String, PortRange>,
}

impl Registry {
    /// Empty registry carrying only the given range as `"default"`.
    pub fn with_default_range(range: PortRange) -> Self {
        let mut registry = Self::default();
        registry
            .port_ranges
            .insert(DEFAULT_RANGE.to_string(), range);
        registry
    }

    pub fn used_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.services.values().map(|s| s.port)
    }

    /// Ports claimed by more than one service, with the claimants.
    ///
    /// Uniqueness is only enforced when a port is auto-assigned, so explicit
    /// ports and manual edits can collide. This reports, it never repairs.
    pub fn duplicate_ports(&self) -> BTreeMap<u16, Vec<String>> {
        let mut by_port: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for (name, entry) in &self.services {
            by_port.entry(entry.port).or_default().push(name.clone());
        }
        by_port.retain(|_, names| names.len() > 1);
        by_port
    }
}
