use crate::controller::ControllerError;
use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(svcreg::config::error))]
    Config(String),

    #[error("Service '{0}' already exists")]
    #[diagnostic(
        code(svcreg::service::exists),
        help("Pick another name, or edit the existing service with `svcreg edit {0}`")
    )]
    ServiceExists(String),

    #[error("Service '{0}' not found")]
    #[diagnostic(
        code(svcreg::service::not_found),
        help("List registered services with `svcreg list`")
    )]
    ServiceNotFound(String),

    #[error("Port range '{0}' not defined")]
    #[diagnostic(
        code(svcreg::range::not_found),
        help("Add it with `svcreg add-range {0} <START> <END>` or list ranges with `svcreg ranges`")
    )]
    RangeNotFound(String),

    #[error("Invalid port range '{name}': end port {end} must be greater than start port {start}")]
    #[diagnostic(code(svcreg::range::invalid))]
    InvalidRange { name: String, start: u16, end: u16 },

    #[error("No available ports in range '{range}' ({start}-{end})")]
    #[diagnostic(
        code(svcreg::port::exhausted),
        help("Widen the range, register with an explicit --port, or use another --range")
    )]
    PortExhausted { range: String, start: u16, end: u16 },

    #[error("Service store {} is corrupt: {reason}", .path.display())]
    #[diagnostic(
        code(svcreg::store::corrupt),
        help("Restore the latest snapshot with `svcreg restore --latest`, or rebuild from running services with `svcreg recover`")
    )]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Environment record {} is malformed: {reason}", .path.display())]
    #[diagnostic(code(svcreg::mirror::malformed))]
    MalformedRecord { path: PathBuf, reason: String },

    #[error("No environment record for service '{0}'")]
    #[diagnostic(code(svcreg::mirror::not_found))]
    RecordNotFound(String),

    #[error("Invalid backup file {}: {reason}", .path.display())]
    #[diagnostic(code(svcreg::backup::invalid))]
    InvalidBackup { path: PathBuf, reason: String },

    #[error("Invalid service name '{name}': {reason}")]
    #[diagnostic(code(svcreg::service::invalid_name))]
    InvalidName { name: String, reason: String },

    #[error("Invalid environment variable: {0}")]
    #[diagnostic(code(svcreg::env::invalid))]
    InvalidEnv(String),

    #[error("Process controller error: {0}")]
    #[diagnostic(
        code(svcreg::controller::error),
        help("Check that systemd user services are available with `systemctl --user status`")
    )]
    Controller(#[from] ControllerError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound(_) => {
                Some("List registered services with: svcreg list".to_string())
            }
            Error::ServiceExists(name) => Some(format!(
                "Service names are unique. Edit the existing one with: svcreg edit {}",
                name
            )),
            Error::RangeNotFound(name) => Some(format!(
                "Define the range first: svcreg add-range {} <START> <END>",
                name
            )),
            Error::PortExhausted { range, .. } => Some(format!(
                "Every port in '{}' is taken. Pass --port explicitly or add a wider range.",
                range
            )),
            Error::CorruptStore { .. } => Some(
                "Restore the newest snapshot with `svcreg restore --latest`, or rebuild the store from running services with `svcreg recover`.\nSnapshots are listed by `svcreg backups`.".to_string()
            ),
            Error::MalformedRecord { .. } => Some(
                "Environment records must contain COMMAND=... and PORT=<number> lines".to_string()
            ),
            Error::Controller(e) if e.is_unavailable() => Some(
                "systemctl could not be executed. Run `svcreg doctor` to check requirements.".to_string()
            ),
            Error::Controller(_) => Some(
                "Inspect the unit with `svcreg logs <name>` or `systemctl --user status`".to_string()
            ),
            Error::Config(_) | Error::Yaml(_) => Some(
                "Check settings.yaml in the svcreg home directory (see `svcreg doctor`)".to_string()
            ),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
