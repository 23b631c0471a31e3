//! `systemctl`/`journalctl` backed controller.
//!
//! Each service `NAME` is the instance of a templated unit,
//! `<prefix>@NAME.service`. All subprocesses go through [`SystemdController::run`]
//! so they share one timeout and one error mapping.

use super::{Action, ControllerError, ProcessController};
use crate::config::Settings;
use crate::port::PortOccupants;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SystemdController {
    unit_prefix: String,
    user_scope: bool,
    timeout: Duration,
}

impl SystemdController {
    pub fn new(unit_prefix: impl Into<String>, user_scope: bool, timeout: Duration) -> Self {
        Self {
            unit_prefix: unit_prefix.into(),
            user_scope,
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.unit_prefix.clone(),
            settings.user_scope,
            settings.command_timeout(),
        )
    }

    /// Unit name for a service, e.g. `svcreg@web.service`.
    pub fn unit_name(&self, name: &str) -> String {
        format!("{}@{}.service", self.unit_prefix, name)
    }

    fn scope_args(&self) -> &'static [&'static str] {
        if self.user_scope {
            &["--user"]
        } else {
            &[]
        }
    }

    /// Run a command with the configured timeout, returning raw Output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output, ControllerError> {
        let cmd_str = format!("{} {}", program, args.join(" "));
        tracing::debug!("Running: {}", cmd_str);

        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ControllerError::unavailable(program, e)),
            Err(_) => Err(ControllerError::timed_out(cmd_str, self.timeout)),
        }
    }

    async fn systemctl(&self, verb: &str, extra: &[&str]) -> Result<Output, ControllerError> {
        let mut args: Vec<&str> = self.scope_args().to_vec();
        args.push(verb);
        args.extend_from_slice(extra);
        self.run("systemctl", &args).await
    }

    async fn main_pid(&self, name: &str) -> Result<Option<u32>, ControllerError> {
        let unit = self.unit_name(name);
        let output = self
            .systemctl("show", &[unit.as_str(), "-p", "MainPID", "--value"])
            .await?;
        if !output.status.success() {
            return Err(ControllerError::query_output(
                format!("systemctl show {}", unit),
                &output,
            ));
        }
        Ok(parse_main_pid(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl ProcessController for SystemdController {
    async fn control(&self, name: &str, action: Action) -> Result<(), ControllerError> {
        let unit = self.unit_name(name);
        let output = self.systemctl(action.as_str(), &[unit.as_str()]).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(ControllerError::action_output(unit, action, &output))
    }

    async fn active_state(&self, name: &str) -> Result<String, ControllerError> {
        let unit = self.unit_name(name);
        // is-active exits non-zero for every state but "active"; that is an
        // answer, not a failure.
        let output = self.systemctl("is-active", &[unit.as_str()]).await?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if state.is_empty() {
            return Ok(if output.status.success() {
                "active".to_string()
            } else {
                "inactive".to_string()
            });
        }
        Ok(state)
    }

    async fn is_enabled(&self, name: &str) -> Result<bool, ControllerError> {
        let unit = self.unit_name(name);
        let output = self.systemctl("is-enabled", &[unit.as_str()]).await?;
        Ok(output.status.success())
    }

    async fn detect_port(&self, name: &str) -> Result<Option<u16>, ControllerError> {
        let Some(pid) = self.main_pid(name).await? else {
            return Ok(None);
        };
        let pid = pid.to_string();
        let output = self
            .run("lsof", &["-i", "-P", "-n", "-a", "-p", pid.as_str()])
            .await?;
        Ok(parse_lsof_listen_port(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    async fn free_port(&self, port: u16, force: bool) -> Result<Vec<u32>, ControllerError> {
        let cmd = format!("free port {}", port);
        tokio::task::spawn_blocking(move || {
            let occupants = PortOccupants::find(port);
            if occupants.is_empty() {
                return Vec::new();
            }
            tracing::debug!("Port {} held by PIDs {:?}", port, occupants.pids());
            occupants.kill(force)
        })
        .await
        .map_err(|e| ControllerError::query_failed(cmd, None, e.to_string()))
    }

    async fn logs(&self, name: &str, lines: usize, follow: bool) -> Result<(), ControllerError> {
        let unit = self.unit_name(name);
        let lines = lines.to_string();
        let mut args: Vec<&str> = self.scope_args().to_vec();
        args.extend_from_slice(&["-u", unit.as_str(), "-n", lines.as_str(), "--no-pager"]);
        if follow {
            args.push("-f");
        }
        let cmd_str = format!("journalctl {}", args.join(" "));
        tracing::debug!("Running: {}", cmd_str);

        let mut child = tokio::process::Command::new("journalctl")
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ControllerError::unavailable("journalctl", e))?;

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| ControllerError::query_failed(&cmd_str, None, e.to_string()))?,
            _ = tokio::signal::ctrl_c() => {
                let _ = child.kill().await;
                return Ok(());
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(ControllerError::query_failed(cmd_str, status.code(), ""))
        }
    }
}

/// `systemctl show -p MainPID --value` prints `0` when nothing runs.
fn parse_main_pid(stdout: &str) -> Option<u32> {
    match stdout.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

/// First listening port in `lsof -i -P -n` output, where the ninth column
/// is `ADDR:PORT`.
fn parse_lsof_listen_port(stdout: &str) -> Option<u16> {
    stdout
        .lines()
        .filter(|line| line.contains("LISTEN"))
        .find_map(|line| {
            let name = line.split_whitespace().nth(8)?;
            name.rsplit(':').next()?.parse::<u16>().ok()
        })
}
