use svcreg::ServiceRegistry;

/// Stream the unit journal. In follow mode Ctrl-C ends the stream and the
/// command exits cleanly; nothing in the store is touched.
pub async fn run_logs(
    registry: &ServiceRegistry,
    name: &str,
    lines: usize,
    follow: bool,
) -> anyhow::Result<()> {
    registry.logs(name, lines, follow).await?;
    if follow {
        println!("\nStopped following logs");
    }
    Ok(())
}
