//! Service definitions and the registry façade.
//!
//! [`types`] holds the document shapes persisted by the store,
//! [`validation`] the rules user input must pass before it becomes a file or
//! unit name, and [`ServiceRegistry`] composes the store, the environment
//! mirror, the port allocator and the process controller.

mod report;
mod service;
mod types;
mod validation;

pub use report::{
    CheckReport, EditReport, ImportReport, PortDetection, RestoreReport, ServiceListing,
    StartReport, StopReport, UnregisterReport,
};
pub use service::{Registration, ServicePatch, ServiceRegistry};
pub use types::{PortRange, Registry, ServiceEntry, DEFAULT_RANGE, PORT_ENV_KEY};
pub use validation::{
    parse_env_assignment, validate_env_name, validate_env_value, validate_service_name,
    validate_user_env_key, RESERVED_ENV_KEYS,
};
