use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "svcreg")]
#[command(version)]
#[command(about = "Personal service registry - declare local services and let systemd run them")]
pub struct Cli {
    /// Registry home directory (defaults to $SVCREG_HOME, then ~/.config/svcreg)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new service
    Register {
        /// Unique service name (letters, digits, '-', '_', '.')
        #[arg(short, long)]
        name: String,

        /// Shell command line to run
        #[arg(short, long)]
        command: String,

        /// Port to use (auto-assigned from --range when omitted or 0)
        #[arg(short, long)]
        port: Option<u16>,

        /// Working directory (defaults to your home directory)
        #[arg(short, long)]
        dir: Option<String>,

        /// Port range used for auto-assignment
        #[arg(short, long, default_value = "default")]
        range: String,

        /// Extra environment variable (KEY=VALUE, can be repeated)
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Enable start at boot
        #[arg(long)]
        auto: bool,

        /// Start the service right away
        #[arg(long)]
        start: bool,
    },

    /// Stop, disable and remove a service
    Unregister {
        name: String,
    },

    /// Change a registered service
    Edit {
        name: String,

        /// New command line
        #[arg(short, long)]
        command: Option<String>,

        /// New port (0 keeps the current one)
        #[arg(short, long)]
        port: Option<u16>,

        /// New working directory
        #[arg(short, long)]
        dir: Option<String>,

        /// Add or replace an environment variable (KEY=VALUE, can be repeated)
        #[arg(long = "env-add", value_name = "KEY=VALUE")]
        env_add: Vec<String>,

        /// Remove an environment variable (can be repeated)
        #[arg(long = "env-remove", value_name = "KEY")]
        env_remove: Vec<String>,

        /// Use the port the running instance actually listens on
        #[arg(long)]
        detect_port: bool,
    },

    /// List services with their live status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one service's definition
    Show {
        name: String,
    },

    /// Start a service
    Start {
        name: String,
    },

    /// Stop a service and free its port
    Stop {
        name: String,

        /// Kill port holders with SIGKILL immediately
        #[arg(short, long)]
        force: bool,
    },

    /// Restart a service
    Restart {
        name: String,
    },

    /// Start a service at boot
    Enable {
        name: String,
    },

    /// Stop starting a service at boot
    Disable {
        name: String,
    },

    /// Enable at boot and start now
    Auto {
        name: String,
    },

    /// Show a service's logs
    Logs {
        name: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Print and exit instead of following
        #[arg(long)]
        no_follow: bool,
    },

    /// Define or replace a port range
    AddRange {
        name: String,
        start: u16,
        end: u16,
    },

    /// List port ranges
    Ranges,

    /// Snapshot the service store
    Backup {
        /// Write to this file instead of the backups directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List store snapshots
    Backups,

    /// Replace the service store with a snapshot
    Restore {
        /// Snapshot file
        #[arg(required_unless_present = "latest", conflicts_with = "latest")]
        file: Option<PathBuf>,

        /// Use the newest snapshot
        #[arg(long)]
        latest: bool,
    },

    /// Add services and ranges from a snapshot without replacing existing ones
    Import {
        file: PathBuf,
    },

    /// Rebuild the service store from the environment records of running services
    Recover,

    /// Kill whatever process holds a port
    KillPort {
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// SIGKILL immediately
        #[arg(short, long)]
        force: bool,
    },

    /// Check requirements and store consistency
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
