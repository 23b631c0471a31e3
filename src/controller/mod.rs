//! Process lifecycle, delegated to the host init system.
//!
//! The registry never spawns service processes itself. It asks a
//! [`ProcessController`] to act on the unit that belongs to a service name and
//! to report what is actually running. [`SystemdController`] talks to
//! `systemctl`/`journalctl`; [`MemoryController`] keeps everything in memory
//! for tests.

mod error;
mod memory;
mod systemd;

pub use error::ControllerError;
pub use memory::{ControllerCall, MemoryController};
pub use systemd::SystemdController;

use async_trait::async_trait;
use std::fmt;

/// Lifecycle operation requested from the init system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl Action {
    /// The `systemctl` verb for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Enable => "enable",
            Action::Disable => "disable",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of a service's unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Active state as reported by the init system (`active`, `inactive`,
    /// `failed`, `activating`, ...).
    pub state: String,
    /// Whether the unit starts at boot.
    pub enabled: bool,
}

impl ServiceStatus {
    pub const ACTIVE: &'static str = "active";
    pub const INACTIVE: &'static str = "inactive";
    pub const UNKNOWN: &'static str = "unknown";

    pub fn is_active(&self) -> bool {
        self.state == Self::ACTIVE
    }

    /// Placeholder status when the controller could not be queried.
    pub fn unknown() -> Self {
        Self {
            state: Self::UNKNOWN.to_string(),
            enabled: false,
        }
    }
}

/// Init-system integration consumed by the registry and the recovery engine.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Apply a lifecycle action to the service's unit.
    async fn control(&self, name: &str, action: Action) -> Result<(), ControllerError>;

    /// Active state string for the service's unit. Units that are not running
    /// report `inactive` (or `failed`), which is not an error.
    async fn active_state(&self, name: &str) -> Result<String, ControllerError>;

    async fn is_enabled(&self, name: &str) -> Result<bool, ControllerError>;

    /// Port the running instance actually listens on, if one can be found.
    async fn detect_port(&self, name: &str) -> Result<Option<u16>, ControllerError>;

    /// Kill whatever holds `port` (never the current process). Returns the
    /// PIDs that were signalled.
    async fn free_port(&self, port: u16, force: bool) -> Result<Vec<u32>, ControllerError>;

    /// Print the unit's journal to stdout. With `follow`, keep streaming
    /// until the user interrupts.
    async fn logs(&self, name: &str, lines: usize, follow: bool) -> Result<(), ControllerError>;

    async fn is_active(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self.active_state(name).await? == ServiceStatus::ACTIVE)
    }

    async fn status(&self, name: &str) -> Result<ServiceStatus, ControllerError> {
        let state = self.active_state(name).await?;
        let enabled = self.is_enabled(name).await?;
        Ok(ServiceStatus { state, enabled })
    }
}
