use std::process::Output;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the init system.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The tool behind the controller could not be run at all.
    #[error("{tool} is unavailable: {source}")]
    Unavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    /// A start/stop/enable/... request was refused for a unit.
    #[error("{action} of {unit} failed ({}): {detail}", exit_status(.code))]
    ActionFailed {
        unit: String,
        action: String,
        code: Option<i32>,
        detail: String,
    },

    /// A read-only query (show, lsof, journalctl) exited unsuccessfully.
    #[error("`{command}` failed ({}): {detail}", exit_status(.code))]
    QueryFailed {
        command: String,
        code: Option<i32>,
        detail: String,
    },
}

impl ControllerError {
    pub fn unavailable(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unavailable {
            tool: tool.into(),
            source,
        }
    }

    pub fn timed_out(command: impl Into<String>, timeout: Duration) -> Self {
        Self::TimedOut {
            command: command.into(),
            timeout,
        }
    }

    pub fn action_failed(
        unit: impl Into<String>,
        action: impl ToString,
        code: Option<i32>,
        detail: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            unit: unit.into(),
            action: action.to_string(),
            code,
            detail: detail.into(),
        }
    }

    /// Action failure carrying the trimmed stderr of `output`.
    pub fn action_output(unit: impl Into<String>, action: impl ToString, output: &Output) -> Self {
        Self::action_failed(unit, action, output.status.code(), stderr_text(output))
    }

    pub fn query_failed(
        command: impl Into<String>,
        code: Option<i32>,
        detail: impl Into<String>,
    ) -> Self {
        Self::QueryFailed {
            command: command.into(),
            code,
            detail: detail.into(),
        }
    }

    pub fn query_output(command: impl Into<String>, output: &Output) -> Self {
        Self::query_failed(command, output.status.code(), stderr_text(output))
    }

    /// The init system itself is missing or unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn action_failure_names_unit_and_exit_code() {
        let err = ControllerError::action_failed("svcreg@web.service", "start", Some(5), "Unit not found.");
        assert_eq!(
            err.to_string(),
            "start of svcreg@web.service failed (exit code 5): Unit not found."
        );
        assert!(!err.is_unavailable());
    }

    #[test]
    fn query_killed_by_signal() {
        let err = ControllerError::query_failed("journalctl -u svcreg@web.service", None, "");
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn unavailable_keeps_io_source() {
        let err = ControllerError::unavailable(
            "systemctl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.is_unavailable());
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "systemctl is unavailable: no such file");
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = ControllerError::timed_out("systemctl --user is-active x", Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "`systemctl --user is-active x` timed out after 10s"
        );
    }
}
