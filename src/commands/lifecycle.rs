use crate::output::{Table, UserOutput};
use serde_json::json;
use svcreg::registry::StartReport;
use svcreg::ServiceRegistry;

pub async fn run_start(
    registry: &ServiceRegistry,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.progress(&format!("Starting '{}'... ", name));
    let report = match registry.start(name).await {
        Ok(report) => report,
        Err(e) => {
            out.finish_progress("failed");
            return Err(e.into());
        }
    };
    out.finish_progress("started");
    print_start_report(name, &report, out);
    Ok(())
}

pub async fn run_stop(
    registry: &ServiceRegistry,
    name: &str,
    force: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = registry.stop(name, force).await?;
    for warning in &report.warnings {
        out.warning(warning);
    }
    if !report.killed.is_empty() {
        out.status(&format!("Killed PIDs {:?} still holding the port", report.killed));
    }
    out.success(&format!("Service '{}' stopped", name));
    Ok(())
}

pub async fn run_restart(
    registry: &ServiceRegistry,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = registry.restart(name).await?;
    out.success(&format!("Service '{}' restarted", name));
    print_start_report(name, &report, out);
    Ok(())
}

pub async fn run_set_autostart(
    registry: &ServiceRegistry,
    name: &str,
    enabled: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    for warning in registry.set_autostart(name, enabled).await? {
        out.warning(&warning);
    }
    if enabled {
        out.success(&format!("Service '{}' will start at boot", name));
    } else {
        out.success(&format!("Service '{}' will no longer start at boot", name));
    }
    Ok(())
}

pub async fn run_auto(
    registry: &ServiceRegistry,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = registry.enable_and_start(name).await?;
    out.success(&format!("Service '{}' enabled at boot and started", name));
    print_start_report(name, &report, out);
    Ok(())
}

pub async fn run_list(
    registry: &ServiceRegistry,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let listings = registry.list().await?;

    if json {
        let services = listings
            .iter()
            .map(|l| {
                (
                    l.name.clone(),
                    json!({
                        "command": l.entry.command,
                        "port": l.entry.port,
                        "working_dir": l.entry.working_dir,
                        "enabled": l.entry.enabled,
                        "env": l.entry.env,
                        "state": l.status.state,
                        "autostart": l.status.enabled,
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>();
        out.data(&serde_json::to_string_pretty(&services)?);
        return Ok(());
    }

    if listings.is_empty() {
        out.status("No services registered. Add one with `svcreg register`.");
        return Ok(());
    }

    let mut table = Table::new(&["NAME", "PORT", "STATE", "BOOT", "COMMAND"]).align_right(1);
    for l in listings {
        table.row(vec![
            l.name,
            l.entry.port.to_string(),
            l.status.state,
            if l.entry.enabled { "yes" } else { "no" }.to_string(),
            l.entry.command,
        ]);
    }
    out.table(&table);
    Ok(())
}

fn print_start_report(name: &str, report: &StartReport, out: &dyn UserOutput) {
    for warning in &report.warnings {
        out.warning(warning);
    }
    match report.reconciled_from {
        Some(previous) => out.status(&format!(
            "'{}' listens on port {} (was recorded as {}); store updated",
            name, report.port, previous
        )),
        None => out.status(&format!("'{}' on port {}", name, report.port)),
    }
}
