use crate::output::UserOutput;
use svcreg::{Settings, ServiceRegistry};

/// Tools the systemd controller shells out to, with whether they are required.
const TOOLS: &[(&str, &[&str], bool)] = &[
    ("systemctl", &["--version"], true),
    ("journalctl", &["--version"], true),
    ("lsof", &["-v"], false),
    ("ss", &["--version"], false),
];

pub async fn run_doctor(
    registry: &ServiceRegistry,
    settings: &Settings,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.status("Checking system requirements...\n");
    let mut all_ok = true;

    for (tool, args, required) in TOOLS {
        out.progress(&format!("{}: ", tool));
        match tokio::process::Command::new(tool).args(*args).output().await {
            // lsof -v exits non-zero on some systems but still ran
            Ok(output) if output.status.success() || *tool == "lsof" => {
                let text = if output.stdout.is_empty() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                };
                let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("found");
                out.finish_progress(first.trim());
            }
            _ if *required => {
                out.finish_progress("Not found");
                all_ok = false;
            }
            _ => out.finish_progress("Not found (optional, used for port detection)"),
        }
    }

    out.progress("systemd user session: ");
    let scope = if settings.user_scope { vec!["--user"] } else { vec![] };
    match tokio::process::Command::new("systemctl")
        .args(&scope)
        .arg("is-system-running")
        .output()
        .await
    {
        Ok(output) => {
            let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
            out.finish_progress(if state.is_empty() { "unknown" } else { state.as_str() });
        }
        Err(_) => {
            out.finish_progress("Unavailable");
            all_ok = false;
        }
    }

    out.blank();
    let paths = registry.store().paths();
    out.status(&format!("Home:      {}", paths.root.display()));
    out.status(&format!("Store:     {}", paths.store_file.display()));
    out.status(&format!("Records:   {}", paths.env_dir.display()));
    out.status(&format!("Backups:   {}", paths.backup_dir.display()));
    out.status(&format!("Unit:      {}@<name>.service", settings.unit_prefix));
    out.blank();

    out.progress("Store consistency: ");
    match registry.check() {
        Ok(report) if report.is_clean() => out.finish_progress("OK"),
        Ok(report) => {
            out.finish_progress("issues found");
            all_ok = false;
            for name in &report.missing_records {
                out.warning(&format!(
                    "'{}' has no environment record (fix with `svcreg edit {}`)",
                    name, name
                ));
            }
            for name in &report.stale_records {
                out.warning(&format!(
                    "'{}' environment record differs from the store (fix with `svcreg edit {}`)",
                    name, name
                ));
            }
            for (name, reason) in &report.malformed_records {
                out.warning(&format!("'{}' environment record is malformed: {}", name, reason));
            }
            for name in &report.orphan_records {
                out.warning(&format!("Environment record '{}' has no service", name));
            }
            for (port, names) in &report.duplicate_ports {
                out.warning(&format!(
                    "Port {} is shared by: {}",
                    port,
                    names.join(", ")
                ));
            }
        }
        Err(e) => {
            out.finish_progress("failed");
            out.error(&e.with_suggestion());
            all_ok = false;
        }
    }

    out.blank();
    if all_ok {
        out.success("All checks passed");
    } else {
        out.warning("Some checks failed (see above)");
    }
    Ok(())
}
