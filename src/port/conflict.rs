use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

/// Time given to SIGTERM'd processes before survivors get SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Processes currently bound to a TCP port.
#[derive(Debug, Clone)]
pub struct PortOccupants {
    pub port: u16,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl PortOccupants {
    /// Look up every process using `port`.
    pub fn find(port: u16) -> Self {
        Self {
            port,
            processes: find_processes_on_port(port),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().map(|p| p.pid).collect()
    }

    /// Signal every occupant except ourselves.
    ///
    /// Without `force`, occupants get SIGTERM, a short grace period, then
    /// SIGKILL if the port is still held. With `force`, SIGKILL straight away.
    /// Returns the PIDs that were signalled.
    pub fn kill(&self, force: bool) -> Vec<u32> {
        let current_pid = std::process::id();
        let mut killed = Vec::new();

        for process in &self.processes {
            if process.pid == current_pid {
                tracing::debug!(
                    "Skipping self (PID {}) when freeing port {}",
                    process.pid,
                    self.port
                );
                continue;
            }
            if send_signal(process.pid, force) {
                killed.push(process.pid);
            }
        }

        if !force && !killed.is_empty() {
            std::thread::sleep(TERM_GRACE);
            let survivors = Self::find(self.port);
            for process in &survivors.processes {
                if process.pid != current_pid && killed.contains(&process.pid) {
                    tracing::debug!(
                        "PID {} still holds port {} after SIGTERM, sending SIGKILL",
                        process.pid,
                        self.port
                    );
                    send_signal(process.pid, true);
                }
            }
        }

        killed
    }
}

/// PIDs 0 (our process group) and 1 (init) are never signalled, nor is
/// anything that does not fit a `pid_t`.
#[cfg(unix)]
fn signal_target(pid: u32) -> Option<nix::unistd::Pid> {
    if pid <= 1 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(unix)]
fn send_signal(pid: u32, force: bool) -> bool {
    use nix::sys::signal::{kill, Signal};

    let Some(nix_pid) = signal_target(pid) else {
        tracing::warn!("Refusing to signal PID {}", pid);
        return false;
    };
    let signal = if force {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };
    match kill(nix_pid, signal) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(e) => {
            tracing::warn!("Failed to send {} to PID {}: {}", signal, pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _force: bool) -> bool {
    false
}

/// Find every process using a port (ss and lsof combined on Linux).
fn find_processes_on_port(port: u16) -> Vec<ProcessInfo> {
    let mut processes = find_processes_ss(port);
    let seen: HashSet<u32> = processes.iter().map(|p| p.pid).collect();
    for p in find_processes_lsof(port) {
        if !seen.contains(&p.pid) {
            processes.push(p);
        }
    }
    processes
}

fn find_processes_ss(port: u16) -> Vec<ProcessInfo> {
    let output = match Command::new("ss")
        .args(["-tlnp", &format!("sport = :{}", port)])
        .output()
    {
        Ok(o) if o.status.success() => o,
        _ => return Vec::new(),
    };
    parse_ss_output(&String::from_utf8_lossy(&output.stdout))
}

fn find_processes_lsof(port: u16) -> Vec<ProcessInfo> {
    let output = match Command::new("lsof")
        .args(["-i", &format!(":{}", port), "-P", "-n", "-F", "pc"])
        .output()
    {
        Ok(o) if o.status.success() => o,
        _ => return Vec::new(),
    };
    parse_lsof_fields(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ss -tlnp` output: `users:(("name",pid=123,fd=4),...)` in the last column.
fn parse_ss_output(stdout: &str) -> Vec<ProcessInfo> {
    let mut processes = Vec::new();
    let mut seen = HashSet::new();

    for line in stdout.lines().skip(1) {
        let Some(users) = line.split_whitespace().last() else {
            continue;
        };
        let mut last_name: Option<String> = None;
        for part in users.split(',') {
            if let Some(start) = part.find("((\"").or_else(|| part.find("(\"")) {
                let name = part[start..].trim_start_matches('(').trim_matches('"');
                last_name = Some(name.to_string());
            }
            if let Some(pid_str) = part.strip_prefix("pid=") {
                if let Ok(pid) = pid_str.parse::<u32>() {
                    if seen.insert(pid) {
                        processes.push(ProcessInfo {
                            pid,
                            name: last_name.clone().unwrap_or_else(|| "unknown".to_string()),
                        });
                    }
                }
            }
        }
    }

    processes
}

/// Parse `lsof -F pc` field output: a `p<PID>` line starts each process,
/// followed by `c<COMMAND>`.
fn parse_lsof_fields(stdout: &str) -> Vec<ProcessInfo> {
    let mut processes: Vec<ProcessInfo> = Vec::new();
    let mut seen = HashSet::new();

    for line in stdout.lines() {
        if let Some(pid_str) = line.strip_prefix('p') {
            if let Ok(pid) = pid_str.parse::<u32>() {
                if seen.insert(pid) {
                    processes.push(ProcessInfo {
                        pid,
                        name: "unknown".to_string(),
                    });
                }
            }
        } else if let Some(command) = line.strip_prefix('c') {
            if let Some(last) = processes.last_mut() {
                last.name = command.to_string();
            }
        }
    }

    processes
}
