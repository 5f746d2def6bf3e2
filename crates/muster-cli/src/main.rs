mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, group::GroupSubcommand, hook::HookFormat, unit::UnitSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "muster",
    about = "Coordination barrier for multi-agent runs: track units, gate aggregators, advance pipelines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: CLAUDE_PROJECT_DIR, else auto-detect from .muster/ or .git/)
    #[arg(long, global = true, env = "MUSTER_ROOT")]
    root: Option<PathBuf>,

    /// Coordination database (default: <root>/.muster/coordination.db)
    #[arg(long, global = true, env = "MUSTER_DB")]
    db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a lifecycle hook event: JSON on stdin, decision on stdout
    Hook {
        /// Event name (session-start, subagent-start, subagent-stop,
        /// pre-tool-use, stop); defaults to the payload's hook_event_name
        event: Option<String>,

        /// Response shape
        #[arg(long, value_enum, default_value_t = HookFormat::Native)]
        format: HookFormat,
    },

    /// Register or complete a unit by hand
    Unit {
        #[command(subcommand)]
        subcommand: UnitSubcommand,
    },

    /// Show completed-versus-total counts for a group
    Progress {
        group: String,

        /// Role to count (default: the pattern's worker role)
        #[arg(long)]
        role: Option<String>,

        /// Expected number of units
        #[arg(long)]
        total: Option<u32>,
    },

    /// Show every unit of a group and its pipeline pointer
    Status { group: String },

    /// List, purge, and prune coordination groups
    Group {
        #[command(subcommand)]
        subcommand: GroupSubcommand,
    },

    /// Inspect and validate .muster/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Hook { .. } => tracing::Level::WARN,
        _ => tracing::Level::INFO,
    };

    // stdout carries hook responses, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let db = cli
        .db
        .clone()
        .unwrap_or_else(|| muster_core::paths::store_path(&root));

    let result = match cli.command {
        Commands::Hook { event, format } => cmd::hook::run(&root, &db, event.as_deref(), format),
        Commands::Unit { subcommand } => cmd::unit::run(&root, &db, subcommand, cli.json),
        Commands::Progress { group, role, total } => {
            cmd::progress::run(&root, &db, &group, role.as_deref(), total, cli.json)
        }
        Commands::Status { group } => cmd::status::run(&root, &db, &group, cli.json),
        Commands::Group { subcommand } => cmd::group::run(&root, &db, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
