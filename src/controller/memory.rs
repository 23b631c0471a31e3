//! In-memory [`ProcessController`] for tests and dry runs.

use super::{Action, ControllerError, ProcessController, ServiceStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One call made against a [`MemoryController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    Control(String, Action),
    FreePort(u16, bool),
    Logs(String),
}

#[derive(Debug, Default)]
struct State {
    active: HashSet<String>,
    enabled: HashSet<String>,
    ports: HashMap<String, u16>,
    /// PIDs pretending to hold each port.
    port_holders: BTreeMap<u16, Vec<u32>>,
    failing: HashSet<(String, Action)>,
    unreachable: bool,
    calls: Vec<ControllerCall>,
}

/// Scripted controller: tests set which services are active, enabled and on
/// which port, inject failures, then inspect the call log.
///
/// `Start`/`Restart` mark a service active, `Stop` inactive, `Enable`/`Disable`
/// flip autostart, matching how systemd would report them afterwards.
#[derive(Debug, Default)]
pub struct MemoryController {
    state: Mutex<State>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, name: &str, active: bool) {
        let mut state = self.state.lock();
        if active {
            state.active.insert(name.to_string());
        } else {
            state.active.remove(name);
        }
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) {
        let mut state = self.state.lock();
        if enabled {
            state.enabled.insert(name.to_string());
        } else {
            state.enabled.remove(name);
        }
    }

    /// Port that `detect_port` will report for `name` while it is active.
    pub fn set_listening_port(&self, name: &str, port: u16) {
        self.state.lock().ports.insert(name.to_string(), port);
    }

    /// Pretend `pids` are bound to `port`, for `free_port`.
    pub fn occupy_port(&self, port: u16, pids: &[u32]) {
        self.state.lock().port_holders.insert(port, pids.to_vec());
    }

    /// Make `action` on `name` fail as if the unit refused it.
    pub fn fail_on(&self, name: &str, action: Action) {
        self.state.lock().failing.insert((name.to_string(), action));
    }

    /// Make every call fail as if the init system were missing.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state.lock().calls.clone()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state.lock().active.contains(name)
    }

    pub fn is_autostart(&self, name: &str) -> bool {
        self.state.lock().enabled.contains(name)
    }

    fn check_reachable(state: &State, command: &str) -> Result<(), ControllerError> {
        if state.unreachable {
            return Err(ControllerError::unavailable(
                "memory controller",
                std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    format!("unreachable while running '{}'", command),
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessController for MemoryController {
    async fn control(&self, name: &str, action: Action) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ControllerCall::Control(name.to_string(), action));
        let command = format!("{} {}", action, name);
        Self::check_reachable(&state, &command)?;
        if state.failing.contains(&(name.to_string(), action)) {
            return Err(ControllerError::action_failed(name, action, Some(1), "injected failure"));
        }

        match action {
            Action::Start | Action::Restart => {
                state.active.insert(name.to_string());
            }
            Action::Stop => {
                state.active.remove(name);
            }
            Action::Enable => {
                state.enabled.insert(name.to_string());
            }
            Action::Disable => {
                state.enabled.remove(name);
            }
        }
        Ok(())
    }

    async fn active_state(&self, name: &str) -> Result<String, ControllerError> {
        let state = self.state.lock();
        Self::check_reachable(&state, &format!("is-active {}", name))?;
        Ok(if state.active.contains(name) {
            ServiceStatus::ACTIVE.to_string()
        } else {
            ServiceStatus::INACTIVE.to_string()
        })
    }

    async fn is_enabled(&self, name: &str) -> Result<bool, ControllerError> {
        let state = self.state.lock();
        Self::check_reachable(&state, &format!("is-enabled {}", name))?;
        Ok(state.enabled.contains(name))
    }

    async fn detect_port(&self, name: &str) -> Result<Option<u16>, ControllerError> {
        let state = self.state.lock();
        Self::check_reachable(&state, &format!("detect-port {}", name))?;
        if !state.active.contains(name) {
            return Ok(None);
        }
        Ok(state.ports.get(name).copied())
    }

    async fn free_port(&self, port: u16, force: bool) -> Result<Vec<u32>, ControllerError> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::FreePort(port, force));
        Self::check_reachable(&state, &format!("free-port {}", port))?;
        let current = std::process::id();
        Ok(state
            .port_holders
            .remove(&port)
            .unwrap_or_default()
            .into_iter()
            .filter(|pid| *pid != current)
            .collect())
    }

    async fn logs(&self, name: &str, _lines: usize, _follow: bool) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        state.calls.push(ControllerCall::Logs(name.to_string()));
        Self::check_reachable(&state, &format!("logs {}", name))
    }
}
