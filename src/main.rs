mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use output::{CliOutput, QuietOutput, UserOutput};
use std::sync::Arc;
use svcreg::{Error as RegError, ServiceRegistry, Settings, StorePaths, SystemdController};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(reg_error) = e.downcast_ref::<RegError>() {
            eprintln!("Error: {}", reg_error.with_suggestion());
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cli_output = CliOutput::detect();
    let out: &dyn UserOutput = if cli.quiet { &QuietOutput } else { &cli_output };

    // ── Tier 1: Commands that need nothing on disk ──────────────────
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    // ── Open the registry ───────────────────────────────────────────
    let paths = StorePaths::discover(cli.home.as_deref())?;
    paths.ensure_dirs()?;
    let settings = Settings::load(&paths.settings_file)?;
    let controller = Arc::new(SystemdController::from_settings(&settings));
    let registry = ServiceRegistry::open(paths, &settings, controller);

    // A lost store is rebuilt from the records before anything reads it.
    let rebuilds_store = matches!(cli.command, Commands::Recover | Commands::Restore { .. });
    if !rebuilds_store && registry.needs_recovery()? {
        out.warning("Service store is missing; recovering from environment records");
        commands::run_recover(&registry, out).await?;
        out.blank();
    }

    // ── Tier 2: Dispatch ────────────────────────────────────────────
    match cli.command {
        Commands::Register {
            name,
            command,
            port,
            dir,
            range,
            env,
            auto,
            start,
        } => {
            let request = commands::RegisterArgs {
                name,
                command,
                port,
                dir,
                range,
                env,
                auto,
                start,
            };
            commands::run_register(&registry, request, out).await
        }
        Commands::Unregister { name } => commands::run_unregister(&registry, &name, out).await,
        Commands::Edit {
            name,
            command,
            port,
            dir,
            env_add,
            env_remove,
            detect_port,
        } => {
            let args = commands::EditArgs {
                command,
                port,
                dir,
                env_add,
                env_remove,
                detect_port,
            };
            commands::run_edit(&registry, &name, args, out).await
        }
        Commands::List { json } => commands::run_list(&registry, json, out).await,
        Commands::Show { name } => commands::run_show(&registry, &name, out),
        Commands::Start { name } => commands::run_start(&registry, &name, out).await,
        Commands::Stop { name, force } => commands::run_stop(&registry, &name, force, out).await,
        Commands::Restart { name } => commands::run_restart(&registry, &name, out).await,
        Commands::Enable { name } => commands::run_set_autostart(&registry, &name, true, out).await,
        Commands::Disable { name } => {
            commands::run_set_autostart(&registry, &name, false, out).await
        }
        Commands::Auto { name } => commands::run_auto(&registry, &name, out).await,
        Commands::Logs {
            name,
            lines,
            no_follow,
        } => commands::run_logs(&registry, &name, lines, !no_follow).await,
        Commands::AddRange { name, start, end } => {
            commands::run_add_range(&registry, &name, start, end, out)
        }
        Commands::Ranges => commands::run_ranges(&registry, out),
        Commands::Backup { output } => commands::run_backup(&registry, output.as_deref(), out),
        Commands::Backups => commands::run_backups(&registry, out),
        Commands::Restore { file, latest } => {
            commands::run_restore(&registry, file.as_deref(), latest, out)
        }
        Commands::Import { file } => commands::run_import(&registry, &file, out),
        Commands::Recover => commands::run_recover(&registry, out).await,
        Commands::KillPort { port, force } => {
            commands::run_kill_port(&registry, port, force, out).await
        }
        Commands::Doctor => commands::run_doctor(&registry, &settings, out).await,
        Commands::Completions { .. } => Ok(()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
