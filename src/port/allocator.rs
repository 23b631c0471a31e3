use crate::registry::{PortRange, Registry};
use std::collections::HashSet;
use std::fmt;

/// Why a port could not be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Every port in `[start, end]` is already recorded for some service.
    Exhausted { start: u16, end: u16 },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::Exhausted { start, end } => {
                write!(f, "No available ports in range {}-{}", start, end)
            }
        }
    }
}

impl std::error::Error for AllocationError {}

/// Pick the lowest port in `range` that no service in `registry` records.
///
/// First-fit over the recorded ports only: whether something outside the
/// registry is bound to the port is not checked, and nothing is reserved.
/// Calling this twice against the same registry returns the same port.
pub fn allocate(range: &PortRange, registry: &Registry) -> Result<u16, AllocationError> {
    let used: HashSet<u16> = registry.used_ports().collect();
    allocate_from(range, &used)
}

/// [`allocate`] against an explicit set of used ports.
pub fn allocate_from(range: &PortRange, used: &HashSet<u16>) -> Result<u16, AllocationError> {
    let exhausted = AllocationError::Exhausted {
        start: range.start,
        end: range.end,
    };
    if range.start > range.end {
        return Err(exhausted);
    }
    (range.start..=range.end)
        .find(|port| !used.contains(port))
        .ok_or(exhausted)
}
