use super::report::*;
use super::validation::{
    validate_env_name, validate_env_value, validate_service_name, validate_user_env_key,
};
use super::{PortRange, Registry, ServiceEntry, DEFAULT_RANGE};
use crate::config::{default_working_dir, Settings, StorePaths};
use crate::controller::{Action, ProcessController, ServiceStatus};
use crate::error::{Error, Result};
use crate::mirror::EnvironmentMirror;
use crate::port::{allocate, AllocationError};
use crate::recovery::{RecoveryEngine, RecoveryReport};
use crate::store::ConfigStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Request to register a new service.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub command: String,
    /// Explicit port; auto-assigned from `range` when `None` or 0
    pub port: Option<u16>,
    /// Defaults to the user's home directory
    pub working_dir: Option<String>,
    pub range: String,
    pub env: BTreeMap<String, String>,
}

impl Registration {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            port: None,
            working_dir: None,
            range: DEFAULT_RANGE.to_string(),
            env: BTreeMap::new(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Partial update applied by [`ServiceRegistry::edit`]. `None` and empty
/// collections leave the field alone.
#[derive(Debug, Clone, Default)]
pub struct ServicePatch {
    pub command: Option<String>,
    pub working_dir: Option<String>,
    /// 0 is treated like `None`
    pub port: Option<u16>,
    pub env_add: BTreeMap<String, String>,
    pub env_remove: Vec<String>,
    /// Ask the controller for the port the running instance listens on. A
    /// detected port takes precedence over `port`.
    pub detect_port: bool,
}

impl ServicePatch {
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
            && self.working_dir.is_none()
            && self.port.is_none()
            && self.env_add.is_empty()
            && self.env_remove.is_empty()
            && !self.detect_port
    }
}

/// Entry point for every service operation.
///
/// Mutations follow one order: validate, mutate in memory, save the store,
/// then render the environment record. A failed save therefore never leaves
/// a rewritten record behind.
pub struct ServiceRegistry {
    store: ConfigStore,
    mirror: EnvironmentMirror,
    controller: Arc<dyn ProcessController>,
    settle_delay: Duration,
    home_dir: String,
}

impl ServiceRegistry {
    pub fn new(
        store: ConfigStore,
        mirror: EnvironmentMirror,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        Self {
            store,
            mirror,
            controller,
            settle_delay: Settings::default().settle_delay(),
            home_dir: default_working_dir(),
        }
    }

    /// Wire up a registry rooted at `paths` with the given settings.
    pub fn open(
        paths: StorePaths,
        settings: &Settings,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        let mirror = EnvironmentMirror::new(paths.env_dir.clone());
        let store = ConfigStore::new(paths).with_default_range(settings.default_range);
        Self::new(store, mirror, controller).with_settle_delay(settings.settle_delay())
    }

    /// Wait between a successful start and port detection.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Directory used when a service has no working directory of its own.
    pub fn with_home_dir(mut self, dir: impl Into<String>) -> Self {
        self.home_dir = dir.into();
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn mirror(&self) -> &EnvironmentMirror {
        &self.mirror
    }

    pub fn controller(&self) -> &dyn ProcessController {
        self.controller.as_ref()
    }

    pub fn load(&self) -> Result<Registry> {
        self.store.load()
    }

    pub fn save(&self, registry: &Registry) -> Result<Option<PathBuf>> {
        self.store.save(registry)
    }

    pub fn get(&self, name: &str) -> Result<ServiceEntry> {
        self.store
            .load()?
            .services
            .remove(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// The primary store is gone but environment records survive.
    pub fn needs_recovery(&self) -> Result<bool> {
        Ok(!self.store.exists() && !self.mirror.list()?.is_empty())
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    /// Add a new service. It starts out registered, stopped and not enabled.
    pub fn register(&self, request: Registration) -> Result<ServiceEntry> {
        validate_service_name(&request.name)?;
        validate_command(&request.command)?;
        for (key, value) in &request.env {
            validate_user_env_key(key)?;
            validate_env_value(key, value)?;
        }
        let working_dir = match &request.working_dir {
            Some(dir) => absolutize(dir)?,
            None => self.home_dir.clone(),
        };

        let mut registry = self.store.load()?;
        if registry.services.contains_key(&request.name) {
            return Err(Error::ServiceExists(request.name));
        }

        let port = match request.port.filter(|port| *port != 0) {
            Some(port) => port,
            None => {
                let range = registry
                    .port_ranges
                    .get(&request.range)
                    .copied()
                    .ok_or_else(|| Error::RangeNotFound(request.range.clone()))?;
                allocate(&range, &registry).map_err(|e| match e {
                    AllocationError::Exhausted { start, end } => Error::PortExhausted {
                        range: request.range.clone(),
                        start,
                        end,
                    },
                })?
            }
        };

        let entry = ServiceEntry::new(request.command, port, working_dir).with_env(request.env);
        registry
            .services
            .insert(request.name.clone(), entry.clone());
        self.store.save(&registry)?;
        self.mirror.write(&request.name, &entry)?;

        tracing::info!("Registered service '{}' on port {}", request.name, port);
        Ok(entry)
    }

    /// Remove a service.
    ///
    /// Stop, disable and port release are attempted first and may fail
    /// without blocking removal; their failures are returned as warnings.
    pub async fn unregister(&self, name: &str) -> Result<UnregisterReport> {
        let entry = self.get(name)?;
        let mut report = UnregisterReport::default();

        for action in [Action::Stop, Action::Disable] {
            if let Err(e) = self.controller.control(name, action).await {
                tracing::warn!("Could not {} '{}' during unregister: {}", action, name, e);
                report.warnings.push(format!("{} failed: {}", action, e));
            }
        }
        match self.controller.free_port(entry.port, false).await {
            Ok(killed) => report.killed = killed,
            Err(e) => {
                tracing::warn!("Could not free port {} of '{}': {}", entry.port, name, e);
                report
                    .warnings
                    .push(format!("freeing port {} failed: {}", entry.port, e));
            }
        }

        let mut registry = self.store.load()?;
        if registry.services.remove(name).is_none() {
            return Err(Error::ServiceNotFound(name.to_string()));
        }
        self.store.save(&registry)?;
        self.mirror.delete(name)?;

        tracing::info!("Unregistered service '{}'", name);
        Ok(report)
    }

    /// Apply a partial update.
    ///
    /// Changes are applied in a fixed order: command, working directory, port
    /// (detected, else explicit), env additions, env removals. `PORT` is
    /// re-synchronised afterwards, and the record is always re-rendered.
    pub async fn edit(&self, name: &str, patch: ServicePatch) -> Result<EditReport> {
        if let Some(command) = &patch.command {
            validate_command(command)?;
        }
        for (key, value) in &patch.env_add {
            validate_user_env_key(key)?;
            validate_env_value(key, value)?;
        }
        for key in &patch.env_remove {
            validate_user_env_key(key)?;
        }
        let working_dir = patch.working_dir.as_deref().map(absolutize).transpose()?;

        let mut registry = self.store.load()?;
        if !registry.services.contains_key(name) {
            return Err(Error::ServiceNotFound(name.to_string()));
        }

        let port_detection = if patch.detect_port {
            match self.controller.detect_port(name).await {
                Ok(Some(port)) => PortDetection::Detected(port),
                Ok(None) => PortDetection::NotFound,
                Err(e) => {
                    tracing::warn!("Port detection for '{}' failed: {}", name, e);
                    PortDetection::Failed(e.to_string())
                }
            }
        } else {
            PortDetection::NotRequested
        };

        let entry = registry
            .services
            .get_mut(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;
        if let Some(command) = patch.command {
            entry.command = command;
        }
        if let Some(dir) = working_dir {
            entry.working_dir = dir;
        }
        match (&port_detection, patch.port) {
            (PortDetection::Detected(port), _) => entry.port = *port,
            (_, Some(port)) if port != 0 => entry.port = port,
            _ => {}
        }
        entry.env.extend(patch.env_add);
        for key in &patch.env_remove {
            entry.env.remove(key);
        }
        entry.sync_port_env();
        let entry = entry.clone();

        self.store.save(&registry)?;
        self.mirror.write(name, &entry)?;

        Ok(EditReport {
            entry,
            port_detection,
        })
    }

    /// Define or replace a port range.
    pub fn add_range(&self, name: &str, start: u16, end: u16) -> Result<PortRange> {
        if name.trim().is_empty() {
            return Err(Error::Config("range name cannot be empty".to_string()));
        }
        let range = PortRange::new(start, end);
        if !range.is_valid() {
            return Err(Error::InvalidRange {
                name: name.to_string(),
                start,
                end,
            });
        }

        let mut registry = self.store.load()?;
        registry.port_ranges.insert(name.to_string(), range);
        self.store.save(&registry)?;
        Ok(range)
    }

    pub fn ranges(&self) -> Result<BTreeMap<String, PortRange>> {
        Ok(self.store.load()?.port_ranges)
    }

    // ========================================================================
    // Process control
    // ========================================================================

    /// Start a service, then reconcile the recorded port with the one the
    /// process actually bound.
    pub async fn start(&self, name: &str) -> Result<StartReport> {
        let entry = self.get(name)?;
        self.controller.control(name, Action::Start).await?;
        self.reconcile_port(name, entry.port).await
    }

    /// Stop a service and free its port. A failed stop is only a warning so
    /// the port is still released.
    pub async fn stop(&self, name: &str, force: bool) -> Result<StopReport> {
        let entry = self.get(name)?;
        let mut report = StopReport::default();

        if let Err(e) = self.controller.control(name, Action::Stop).await {
            tracing::warn!("Stopping '{}' failed: {}", name, e);
            report.warnings.push(format!("stop failed: {}", e));
        }
        match self.controller.free_port(entry.port, force).await {
            Ok(killed) => report.killed = killed,
            Err(e) => {
                tracing::warn!("Could not free port {}: {}", entry.port, e);
                report
                    .warnings
                    .push(format!("freeing port {} failed: {}", entry.port, e));
            }
        }
        Ok(report)
    }

    pub async fn restart(&self, name: &str) -> Result<StartReport> {
        let mut warnings = self.stop(name, false).await?.warnings;
        let mut report = self.start(name).await?;
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        Ok(report)
    }

    /// Turn start-at-boot on or off and persist the flag.
    ///
    /// Failing to enable is an error; failing to disable is a warning and the
    /// flag is still cleared.
    pub async fn set_autostart(&self, name: &str, enabled: bool) -> Result<Vec<String>> {
        self.get(name)?;
        let mut warnings = Vec::new();

        if enabled {
            self.controller.control(name, Action::Enable).await?;
        } else if let Err(e) = self.controller.control(name, Action::Disable).await {
            tracing::warn!("Disabling '{}' failed: {}", name, e);
            warnings.push(format!("disable failed: {}", e));
        }

        let mut registry = self.store.load()?;
        let entry = registry
            .services
            .get_mut(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;
        if entry.enabled != enabled {
            entry.enabled = enabled;
            self.store.save(&registry)?;
        }
        Ok(warnings)
    }

    /// Enable at boot, then start now.
    pub async fn enable_and_start(&self, name: &str) -> Result<StartReport> {
        let mut warnings = self.set_autostart(name, true).await?;
        let mut report = self.start(name).await?;
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        Ok(report)
    }

    /// Every service with its live status.
    pub async fn list(&self) -> Result<Vec<ServiceListing>> {
        let registry = self.store.load()?;
        let mut listings = Vec::with_capacity(registry.services.len());
        for (name, entry) in registry.services {
            let status = match self.controller.status(&name).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::debug!("Status of '{}' unavailable: {}", name, e);
                    ServiceStatus::unknown()
                }
            };
            listings.push(ServiceListing {
                name,
                entry,
                status,
            });
        }
        Ok(listings)
    }

    pub async fn logs(&self, name: &str, lines: usize, follow: bool) -> Result<()> {
        self.get(name)?;
        self.controller.logs(name, lines, follow).await?;
        Ok(())
    }

    /// Kill whatever holds `port`, registered or not.
    pub async fn kill_port(&self, port: u16, force: bool) -> Result<Vec<u32>> {
        Ok(self.controller.free_port(port, force).await?)
    }

    async fn reconcile_port(&self, name: &str, recorded: u16) -> Result<StartReport> {
        let mut report = StartReport {
            port: recorded,
            ..StartReport::default()
        };

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let detected = match self.controller.detect_port(name).await {
            Ok(detected) => detected,
            Err(e) => {
                tracing::warn!("Port detection for '{}' failed: {}", name, e);
                report.warnings.push(format!("port detection failed: {}", e));
                None
            }
        };

        let Some(actual) = detected.filter(|port| *port != recorded) else {
            return Ok(report);
        };

        let mut registry = self.store.load()?;
        let entry = registry
            .services
            .get_mut(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;
        entry.set_port(actual);
        let entry = entry.clone();
        self.store.save(&registry)?;
        self.mirror.write(name, &entry)?;

        tracing::info!(
            "Service '{}' listens on {} (recorded {}); updated",
            name,
            actual,
            recorded
        );
        report.port = actual;
        report.reconciled_from = Some(recorded);
        Ok(report)
    }

    // ========================================================================
    // Bulk operations and maintenance
    // ========================================================================

    /// Merge services and ranges from another registry. Existing names are
    /// kept as they are.
    pub fn import(&self, incoming: Registry) -> Result<ImportReport> {
        let mut registry = self.store.load()?;
        let mut report = ImportReport::default();
        let mut imported = Vec::new();

        for (name, mut entry) in incoming.services {
            if registry.services.contains_key(&name) {
                report.services_skipped.push(name);
                continue;
            }
            if let Err(e) = validate_snapshot_entry(&name, &entry) {
                tracing::warn!("Skipping imported service '{}': {}", name, e);
                report.services_skipped.push(name);
                continue;
            }
            entry.sync_port_env();
            imported.push((name.clone(), entry.clone()));
            registry.services.insert(name.clone(), entry);
            report.services_added.push(name);
        }

        for (name, range) in incoming.port_ranges {
            if registry.port_ranges.contains_key(&name) || !range.is_valid() {
                report.ranges_skipped.push(name);
                continue;
            }
            registry.port_ranges.insert(name.clone(), range);
            report.ranges_added.push(name);
        }

        self.store.save(&registry)?;
        for (name, entry) in &imported {
            self.mirror.write(name, entry)?;
        }
        Ok(report)
    }

    pub fn import_file(&self, path: &Path) -> Result<ImportReport> {
        self.import(ConfigStore::read_snapshot(path)?)
    }

    /// Replace the store with a snapshot and re-render every record.
    ///
    /// A snapshot with an unusable service name, entry or range is rejected
    /// before anything is written. The replaced store is snapshotted by the
    /// usual save rule, or copied verbatim if it is too broken for that.
    /// Records with no service in the snapshot are reported and left on disk.
    pub fn restore(&self, path: &Path) -> Result<RestoreReport> {
        let mut snapshot = ConfigStore::read_snapshot(path)?;
        let invalid = |reason: String| Error::InvalidBackup {
            path: path.to_path_buf(),
            reason,
        };
        for (name, entry) in &snapshot.services {
            validate_snapshot_entry(name, entry).map_err(|e| invalid(e.to_string()))?;
        }
        for (name, range) in &snapshot.port_ranges {
            if !range.is_valid() {
                return Err(invalid(format!(
                    "range '{}' ({}-{}) must end above its start",
                    name, range.start, range.end
                )));
            }
        }
        for entry in snapshot.services.values_mut() {
            entry.sync_port_env();
        }

        let preserved_corrupt = self.store.preserve_corrupt()?;
        let backup = self.store.save(&snapshot)?;
        for (name, entry) in &snapshot.services {
            self.mirror.write(name, entry)?;
        }
        let orphan_records: Vec<String> = self
            .mirror
            .list()?
            .into_iter()
            .filter(|name| !snapshot.services.contains_key(name))
            .collect();
        for name in &orphan_records {
            tracing::warn!("Environment record '{}' has no service after restore", name);
        }

        tracing::info!("Restored service store from {}", path.display());
        Ok(RestoreReport {
            services: snapshot.services.keys().cloned().collect(),
            ranges: snapshot.port_ranges,
            backup,
            preserved_corrupt,
            orphan_records,
        })
    }

    /// Restore from the newest snapshot.
    pub fn restore_latest(&self) -> Result<RestoreReport> {
        let latest = self.store.latest_backup()?.ok_or_else(|| {
            Error::Config(format!(
                "No backups found in {}",
                self.store.paths().backup_dir.display()
            ))
        })?;
        self.restore(&latest.path)
    }

    /// Compare the store against the environment records.
    pub fn check(&self) -> Result<CheckReport> {
        let registry = self.store.load()?;
        let records = self.mirror.list()?;
        let mut report = CheckReport {
            duplicate_ports: registry.duplicate_ports(),
            ..CheckReport::default()
        };

        for (name, entry) in &registry.services {
            match self.mirror.read(name) {
                Ok(record) => {
                    let expected_dir = (!entry.working_dir.is_empty()).then_some(&entry.working_dir);
                    let actual_dir = (!record.working_dir.is_empty()).then_some(&record.working_dir);
                    if record.command != entry.command
                        || record.port != entry.port
                        || expected_dir != actual_dir
                    {
                        report.stale_records.push(name.clone());
                    }
                }
                Err(Error::RecordNotFound(_)) => report.missing_records.push(name.clone()),
                Err(Error::MalformedRecord { reason, .. }) => {
                    report.malformed_records.push((name.clone(), reason))
                }
                Err(e) => return Err(e),
            }
        }
        report.orphan_records = records
            .into_iter()
            .filter(|name| !registry.services.contains_key(name))
            .collect();

        Ok(report)
    }

    /// Rebuild the store from environment records of running services.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        RecoveryEngine::new(&self.store, &self.mirror, self.controller.as_ref())
            .with_home_dir(self.home_dir.clone())
            .run()
            .await
    }
}

fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(Error::Config("command cannot be empty".to_string()));
    }
    if command.contains('\n') || command.contains('\r') {
        return Err(Error::Config(
            "command cannot contain line breaks".to_string(),
        ));
    }
    Ok(())
}

/// An entry read from a file rather than built from validated input.
fn validate_snapshot_entry(name: &str, entry: &ServiceEntry) -> Result<()> {
    validate_service_name(name)?;
    validate_command(&entry.command)?;
    if entry.working_dir.contains('\n') || entry.working_dir.contains('\r') {
        return Err(Error::Config(
            "working directory cannot contain line breaks".to_string(),
        ));
    }
    for (key, value) in &entry.env {
        validate_env_name(key)?;
        validate_env_value(key, value)?;
    }
    Ok(())
}

/// Resolve a working directory against the current directory.
fn absolutize(dir: &str) -> Result<String> {
    if dir.contains('\n') || dir.contains('\r') {
        return Err(Error::Config(
            "working directory cannot contain line breaks".to_string(),
        ));
    }
    let path = Path::new(dir);
    if path.is_absolute() {
        return Ok(dir.to_string());
    }
    Ok(std::env::current_dir()?
        .join(path)
        .to_string_lossy()
        .into_owned())
}
