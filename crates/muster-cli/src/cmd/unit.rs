use crate::cmd::open_store;
use crate::output::print_json;
use anyhow::Context;
use clap::{Args, Subcommand};
use muster_core::types::{PatternKind, Role};
use muster_core::unit::UnitSpec;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct UnitArgs {
    /// Coordination group id
    group: String,

    /// Unit id (an index or an agent id)
    unit: String,

    /// hierarchy, pipeline, or map_reduce
    #[arg(long)]
    pattern: String,

    /// Unit role (default: the pattern's worker role)
    #[arg(long)]
    role: Option<String>,

    /// Ordinal position within the group
    #[arg(long)]
    index: Option<u32>,

    /// Expected number of units in the group
    #[arg(long)]
    total: Option<u32>,
}

#[derive(Subcommand)]
pub enum UnitSubcommand {
    /// Record that a unit has started
    Register {
        #[command(flatten)]
        unit: UnitArgs,

        /// Coordinator or parent agent id
        #[arg(long)]
        parent: Option<String>,
    },

    /// Mark a unit completed and print the group's progress
    Complete {
        #[command(flatten)]
        unit: UnitArgs,

        /// Output payload (kept only if none was recorded before)
        #[arg(long, conflicts_with = "output_file")]
        output: Option<String>,

        /// Read the output payload from a file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },
}

impl UnitArgs {
    fn spec(&self) -> anyhow::Result<UnitSpec> {
        let kind: PatternKind = self.pattern.parse()?;
        let role = match &self.role {
            Some(r) => r.parse::<Role>()?,
            None => kind.worker_role(),
        };
        let mut spec = UnitSpec::new(&self.group, kind, &self.unit, role);
        spec.index = self.index;
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, db: &Path, subcmd: UnitSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        UnitSubcommand::Register { unit, parent } => register(root, db, &unit, parent, json),
        UnitSubcommand::Complete {
            unit,
            output,
            output_file,
        } => complete(root, db, &unit, output, output_file, json),
    }
}

fn register(
    root: &Path,
    db: &Path,
    args: &UnitArgs,
    parent: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut spec = args.spec()?;
    spec.parent_id = parent;
    let mut store = open_store(root, db)?;
    store
        .register_unit(&spec, args.total)
        .with_context(|| format!("failed to register unit '{}'", spec.key()))?;

    if json {
        print_json(&serde_json::json!({
            "group_id": spec.group_id,
            "unit_id": spec.unit_id,
            "role": spec.role,
            "status": "registered",
        }))?;
    } else {
        println!("Registered {} {} in {}", spec.role, spec.unit_id, spec.group_id);
    }
    Ok(())
}

fn complete(
    root: &Path,
    db: &Path,
    args: &UnitArgs,
    output: Option<String>,
    output_file: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let spec = args.spec()?;
    let output = match output_file {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => output,
    };

    let mut store = open_store(root, db)?;
    let done = store
        .complete_unit(&spec, output.as_deref(), args.total)
        .with_context(|| format!("failed to complete unit '{}'", spec.key()))?;
    let progress = done.progress;

    if json {
        print_json(&serde_json::json!({
            "group_id": spec.group_id,
            "unit_id": spec.unit_id,
            "role": spec.role,
            "completed": progress.completed,
            "total": progress.total,
            "all_complete": progress.is_complete(),
            "newly_completed": done.newly_completed,
        }))?;
    } else {
        println!(
            "Completed {} {} in {} ({}/{})",
            spec.role, spec.unit_id, spec.group_id, progress.completed, progress.total
        );
    }
    Ok(())
}
