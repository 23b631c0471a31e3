//! Rebuilding the store from environment records.
//!
//! Only records whose unit is currently active are trusted: a record for a
//! service that no longer runs may carry a stale command or port. Autostart
//! is read back from the init system, since records do not carry it.

use crate::config::default_working_dir;
use crate::controller::ProcessController;
use crate::error::{Error, Result};
use crate::mirror::EnvironmentMirror;
use crate::registry::{validate_service_name, Registry};
use crate::store::ConfigStore;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Services written to the rebuilt store
    pub recovered: Vec<String>,
    /// Records skipped because their unit is not active
    pub inactive: Vec<String>,
    /// Records skipped because activity could not be verified
    pub unverified: Vec<String>,
    /// Records that could not be parsed, with the reason
    pub malformed: Vec<(String, String)>,
    /// Verbatim copy of a corrupt store taken before it was replaced
    pub preserved_corrupt: Option<PathBuf>,
    /// Snapshot taken by the save that wrote the rebuilt store
    pub backup: Option<PathBuf>,
}

impl RecoveryReport {
    pub fn count(&self) -> usize {
        self.recovered.len()
    }
}

pub struct RecoveryEngine<'a> {
    store: &'a ConfigStore,
    mirror: &'a EnvironmentMirror,
    controller: &'a dyn ProcessController,
    home_dir: String,
}

impl<'a> RecoveryEngine<'a> {
    pub fn new(
        store: &'a ConfigStore,
        mirror: &'a EnvironmentMirror,
        controller: &'a dyn ProcessController,
    ) -> Self {
        Self {
            store,
            mirror,
            controller,
            home_dir: default_working_dir(),
        }
    }

    /// Working directory for records without `WORKING_DIR`.
    pub fn with_home_dir(mut self, dir: impl Into<String>) -> Self {
        self.home_dir = dir.into();
        self
    }

    /// Rebuild and save the store. Recovering zero services is a valid outcome
    /// and still writes an empty store with the default range.
    pub async fn run(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let mut registry = Registry::with_default_range(self.store.default_range());

        for name in self.mirror.list()? {
            if let Err(e) = validate_service_name(&name) {
                tracing::warn!("Ignoring environment record: {}", e);
                report.malformed.push((name, e.to_string()));
                continue;
            }

            match self.controller.is_active(&name).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Skipping '{}': not active", name);
                    report.inactive.push(name);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping '{}': could not query state: {}", name, e);
                    report.unverified.push(name);
                    continue;
                }
            }

            let record = match self.mirror.read(&name) {
                Ok(record) => record,
                Err(Error::MalformedRecord { reason, .. }) => {
                    tracing::warn!("Skipping malformed record for '{}': {}", name, reason);
                    report.malformed.push((name, reason));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let enabled = match self.controller.is_enabled(&name).await {
                Ok(enabled) => enabled,
                Err(e) => {
                    tracing::warn!("Could not read autostart of '{}': {}", name, e);
                    false
                }
            };

            let mut entry = record.into_entry(enabled);
            if entry.working_dir.is_empty() {
                entry.working_dir = self.home_dir.clone();
            }
            registry.services.insert(name.clone(), entry);
            report.recovered.push(name);
        }

        report.preserved_corrupt = self.store.preserve_corrupt()?;

        report.backup = self.store.save(&registry)?;
        tracing::info!(
            "Recovered {} service(s) from environment records",
            report.count()
        );
        Ok(report)
    }
}
