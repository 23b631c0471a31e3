//! Configuration for svcreg.
//!
//! - `paths` - where the store, environment records and snapshots live (`StorePaths`)
//! - `settings` - optional `settings.yaml` tuning the host integration (`Settings`)

mod paths;
mod settings;

pub use paths::*;
pub use settings::*;
