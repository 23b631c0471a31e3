use crate::output::UserOutput;
use svcreg::ServiceRegistry;

pub async fn run_kill_port(
    registry: &ServiceRegistry,
    port: u16,
    force: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let killed = registry.kill_port(port, force).await?;
    if killed.is_empty() {
        out.status(&format!("No process found on port {}", port));
        return Ok(());
    }

    let owner = registry
        .load()?
        .services
        .into_iter()
        .find(|(_, entry)| entry.port == port)
        .map(|(name, _)| name);
    out.success(&format!(
        "Killed {} process(es) on port {}: {:?}",
        killed.len(),
        port,
        killed
    ));
    if let Some(name) = owner {
        out.status(&format!(
            "Port {} belongs to '{}'; systemd may restart it (use `svcreg stop {}`)",
            port, name, name
        ));
    }
    Ok(())
}
