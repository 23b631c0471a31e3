//! Outcomes of registry operations.
//!
//! Operations that keep going past a failed best-effort step (a stop that
//! could not reach the init system, a port that could not be detected) carry
//! those failures here as warnings instead of failing the whole call.

use super::{PortRange, ServiceEntry};
use crate::controller::ServiceStatus;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Result of the "detect port from the live process" step of an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortDetection {
    NotRequested,
    Detected(u16),
    /// The process runs but no listening socket was found, or it is not running.
    NotFound,
    /// The controller could not be queried.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct EditReport {
    pub entry: ServiceEntry,
    pub port_detection: PortDetection,
}

#[derive(Debug, Clone, Default)]
pub struct UnregisterReport {
    /// Best-effort controller steps that failed
    pub warnings: Vec<String>,
    /// PIDs killed to free the service's port
    pub killed: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct StartReport {
    /// Port recorded after the start
    pub port: u16,
    /// Recorded port before reconciliation, when the live port differed
    pub reconciled_from: Option<u16>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub killed: Vec<u32>,
    pub warnings: Vec<String>,
}

/// One row of `list`.
#[derive(Debug, Clone)]
pub struct ServiceListing {
    pub name: String,
    pub entry: ServiceEntry,
    /// `unknown` when the controller could not be queried
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub services_added: Vec<String>,
    pub services_skipped: Vec<String>,
    pub ranges_added: Vec<String>,
    pub ranges_skipped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub services: Vec<String>,
    pub ranges: BTreeMap<String, PortRange>,
    /// Snapshot of the store that the restore replaced
    pub backup: Option<PathBuf>,
    /// Verbatim copy of a store too broken to snapshot normally
    pub preserved_corrupt: Option<PathBuf>,
    /// Environment records left on disk with no matching service
    pub orphan_records: Vec<String>,
}

/// Consistency findings. Nothing here is repaired automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Services with no environment record
    pub missing_records: Vec<String>,
    /// Environment records with no service
    pub orphan_records: Vec<String>,
    /// Records that exist but do not parse, with the reason
    pub malformed_records: Vec<(String, String)>,
    /// Services whose record disagrees with the store (command or port)
    pub stale_records: Vec<String>,
    /// Ports claimed by more than one service
    pub duplicate_ports: BTreeMap<u16, Vec<String>>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.missing_records.is_empty()
            && self.orphan_records.is_empty()
            && self.malformed_records.is_empty()
            && self.stale_records.is_empty()
            && self.duplicate_ports.is_empty()
    }
}
