use crate::output::{Table, UserOutput};
use std::path::Path;
use svcreg::ServiceRegistry;

pub fn run_add_range(
    registry: &ServiceRegistry,
    name: &str,
    start: u16,
    end: u16,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let range = registry.add_range(name, start, end)?;
    out.success(&format!(
        "Port range '{}' set to {}-{} ({} ports)",
        name,
        range.start,
        range.end,
        range.len()
    ));
    Ok(())
}

pub fn run_ranges(registry: &ServiceRegistry, out: &dyn UserOutput) -> anyhow::Result<()> {
    let ranges = registry.ranges()?;
    if ranges.is_empty() {
        out.status("No port ranges defined");
        return Ok(());
    }
    for (name, range) in ranges {
        out.status(&format!("{}: {}-{}", name, range.start, range.end));
    }
    Ok(())
}

pub fn run_backup(
    registry: &ServiceRegistry,
    output: Option<&Path>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    if let Some(path) = output {
        registry.store().export_to(path)?;
        out.success(&format!("Exported service store to {}", path.display()));
        return Ok(());
    }

    // Make sure there is a document to copy.
    registry.load()?;
    match registry.store().backup()? {
        Some(path) => out.success(&format!("Backup written to {}", path.display())),
        None => out.status("Nothing to back up"),
    }
    Ok(())
}

pub fn run_backups(registry: &ServiceRegistry, out: &dyn UserOutput) -> anyhow::Result<()> {
    let backups = registry.store().list_backups()?;
    if backups.is_empty() {
        out.status(&format!(
            "No backups in {}",
            registry.store().paths().backup_dir.display()
        ));
        return Ok(());
    }
    let mut table = Table::new(&["TAKEN", "FILE"]);
    for backup in backups {
        table.row(vec![
            backup.taken_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            backup.path.display().to_string(),
        ]);
    }
    out.table(&table);
    Ok(())
}

pub fn run_restore(
    registry: &ServiceRegistry,
    file: Option<&Path>,
    latest: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = match file {
        Some(path) if !latest => registry.restore(path)?,
        _ => registry.restore_latest()?,
    };

    if let Some(copy) = &report.preserved_corrupt {
        out.status(&format!("Corrupt store copied to {}", copy.display()));
    }
    if let Some(backup) = &report.backup {
        out.status(&format!("Previous store saved to {}", backup.display()));
    }
    out.success(&format!(
        "Restored {} service(s) and {} port range(s)",
        report.services.len(),
        report.ranges.len()
    ));
    if !report.orphan_records.is_empty() {
        out.warning(&format!(
            "Environment records without a service (left in place): {}",
            report.orphan_records.join(", ")
        ));
    }
    Ok(())
}

pub fn run_import(registry: &ServiceRegistry, file: &Path, out: &dyn UserOutput) -> anyhow::Result<()> {
    let report = registry.import_file(file)?;
    out.success(&format!(
        "Imported {} service(s) and {} port range(s)",
        report.services_added.len(),
        report.ranges_added.len()
    ));
    if !report.services_skipped.is_empty() {
        out.warning(&format!(
            "Skipped existing or invalid services: {}",
            report.services_skipped.join(", ")
        ));
    }
    if !report.ranges_skipped.is_empty() {
        out.warning(&format!(
            "Skipped existing or invalid ranges: {}",
            report.ranges_skipped.join(", ")
        ));
    }
    Ok(())
}

pub async fn run_recover(registry: &ServiceRegistry, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status("Recovering services from environment records...");
    let report = registry.recover().await?;

    if let Some(path) = &report.preserved_corrupt {
        out.status(&format!("Corrupt store preserved at {}", path.display()));
    }
    for name in &report.recovered {
        out.status(&format!("  recovered {}", name));
    }
    if !report.inactive.is_empty() {
        out.status(&format!(
            "  skipped (not running): {}",
            report.inactive.join(", ")
        ));
    }
    if !report.unverified.is_empty() {
        out.warning(&format!(
            "Could not check whether these are running, skipped: {}",
            report.unverified.join(", ")
        ));
    }
    for (name, reason) in &report.malformed {
        out.warning(&format!("Skipped record '{}': {}", name, reason));
    }
    out.success(&format!("Recovered {} service(s)", report.count()));
    Ok(())
}
