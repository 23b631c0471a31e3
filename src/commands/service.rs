use crate::output::UserOutput;
use svcreg::registry::{parse_env_assignment, validate_user_env_key, PortDetection};
use svcreg::{Registration, ServiceEntry, ServicePatch, ServiceRegistry};

pub struct RegisterArgs {
    pub name: String,
    pub command: String,
    pub port: Option<u16>,
    pub dir: Option<String>,
    pub range: String,
    pub env: Vec<String>,
    pub auto: bool,
    pub start: bool,
}

pub struct EditArgs {
    pub command: Option<String>,
    pub port: Option<u16>,
    pub dir: Option<String>,
    pub env_add: Vec<String>,
    pub env_remove: Vec<String>,
    pub detect_port: bool,
}

pub async fn run_register(
    registry: &ServiceRegistry,
    args: RegisterArgs,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let mut request = Registration::new(&args.name, args.command).range(args.range);
    if let Some(port) = args.port {
        request = request.port(port);
    }
    if let Some(dir) = args.dir {
        request = request.working_dir(dir);
    }
    for raw in &args.env {
        let (key, value) = parse_env_assignment(raw)?;
        request = request.env(key, value);
    }

    let entry = registry.register(request)?;
    out.success(&format!(
        "Service '{}' registered on port {}",
        args.name, entry.port
    ));

    if args.auto {
        for warning in registry.set_autostart(&args.name, true).await? {
            out.warning(&warning);
        }
        out.status(&format!("Enabled '{}' at boot", args.name));
    }
    if args.start {
        super::lifecycle::run_start(registry, &args.name, out).await?;
    }
    Ok(())
}

pub async fn run_unregister(
    registry: &ServiceRegistry,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let report = registry.unregister(name).await?;
    for warning in &report.warnings {
        out.warning(warning);
    }
    if !report.killed.is_empty() {
        out.status(&format!("Killed PIDs {:?} holding the service port", report.killed));
    }
    out.success(&format!("Service '{}' unregistered", name));
    Ok(())
}

pub async fn run_edit(
    registry: &ServiceRegistry,
    name: &str,
    args: EditArgs,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let mut patch = ServicePatch {
        command: args.command,
        working_dir: args.dir,
        port: args.port,
        detect_port: args.detect_port,
        ..ServicePatch::default()
    };
    for raw in &args.env_add {
        let (key, value) = parse_env_assignment(raw)?;
        patch.env_add.insert(key, value);
    }
    for key in args.env_remove {
        validate_user_env_key(&key)?;
        patch.env_remove.push(key);
    }
    if patch.is_empty() {
        out.warning("Nothing to change; the environment record is re-rendered anyway");
    }

    let report = registry.edit(name, patch).await?;
    match &report.port_detection {
        PortDetection::NotRequested => {}
        PortDetection::Detected(port) => out.status(&format!("Detected port {}", port)),
        PortDetection::NotFound => out.warning(&format!(
            "No listening port found for '{}'; port left at {}",
            name, report.entry.port
        )),
        PortDetection::Failed(reason) => {
            out.warning(&format!("Port detection failed: {}", reason))
        }
    }
    out.success(&format!("Service '{}' updated", name));
    print_entry(name, &report.entry, out);
    Ok(())
}

pub fn run_show(registry: &ServiceRegistry, name: &str, out: &dyn UserOutput) -> anyhow::Result<()> {
    let entry = registry.get(name)?;
    print_entry(name, &entry, out);
    Ok(())
}

fn print_entry(name: &str, entry: &ServiceEntry, out: &dyn UserOutput) {
    out.status(&format!("{}:", name));
    out.status(&format!("  command:     {}", entry.command));
    out.status(&format!("  port:        {}", entry.port));
    out.status(&format!("  working_dir: {}", entry.working_dir));
    out.status(&format!("  enabled:     {}", entry.enabled));
    if !entry.env.is_empty() {
        out.status("  env:");
        for (key, value) in &entry.env {
            out.status(&format!("    {}={}", key, value));
        }
    }
}
