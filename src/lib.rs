//! # svcreg
//!
//! A personal service registry: declare long-running local processes (name,
//! command, port, working directory, environment) and hand their lifecycle to
//! the host init system.
//!
//! ## Features
//!
//! - **Crash-safe store**: every save of `services.json` snapshots the previous
//!   document first, whenever it still holds a service
//! - **Environment mirror**: one `KEY=VALUE` record per service, independent of
//!   the store and readable by systemd as an `EnvironmentFile`
//! - **Port allocation**: deterministic first-fit assignment from named ranges
//! - **Recovery**: rebuild a lost store from the records of services that are
//!   still running
//! - **Port reconciliation**: after a start, the port the process actually
//!   bound replaces the recorded one
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use svcreg::{Registration, ServiceRegistry, Settings, StorePaths, SystemdController};
//!
//! # async fn example() -> Result<(), svcreg::Error> {
//! let paths = StorePaths::discover(None)?;
//! let settings = Settings::load(&paths.settings_file)?;
//! let controller = Arc::new(SystemdController::from_settings(&settings));
//! let registry = ServiceRegistry::open(paths, &settings, controller);
//!
//! let entry = registry.register(Registration::new("site", "python -m http.server $PORT"))?;
//! println!("site registered on port {}", entry.port);
//!
//! registry.start("site").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod mirror;
pub mod port;
pub mod recovery;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use config::{Settings, StorePaths};
pub use controller::{
    Action, ControllerError, MemoryController, ProcessController, ServiceStatus,
    SystemdController,
};
pub use error::{Error, Result};
pub use mirror::{EnvironmentMirror, MirrorRecord};
pub use recovery::{RecoveryEngine, RecoveryReport};
pub use registry::{
    PortRange, Registration, Registry, ServiceEntry, ServicePatch, ServiceRegistry,
};
pub use store::{BackupInfo, ConfigStore};
