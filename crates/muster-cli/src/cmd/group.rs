use crate::cmd::open_store;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use muster_core::paths::validate_ident;
use std::path::Path;

#[derive(Subcommand)]
pub enum GroupSubcommand {
    /// List every known group, most recently active first
    List,

    /// Delete a group and all of its units
    Purge { group: String },

    /// Delete groups with no activity in the given number of days
    Prune {
        #[arg(long)]
        older_than_days: u32,
    },
}

pub fn run(root: &Path, db: &Path, subcmd: GroupSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        GroupSubcommand::List => list(root, db, json),
        GroupSubcommand::Purge { group } => purge(root, db, &group, json),
        GroupSubcommand::Prune { older_than_days } => prune(root, db, older_than_days, json),
    }
}

fn list(root: &Path, db: &Path, json: bool) -> anyhow::Result<()> {
    let store = open_store(root, db)?;
    let groups = store.groups()?;

    if json {
        print_json(&groups)?;
        return Ok(());
    }
    if groups.is_empty() {
        println!("No coordination groups.");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(groups.len());
    for g in &groups {
        let completed = store.progress(&g.group_id, g.kind.worker_role(), g.total_units)?;
        rows.push(vec![
            g.group_id.clone(),
            g.kind.to_string(),
            match g.total_units {
                Some(t) => format!("{}/{t}", completed.completed),
                None => format!("{}/?", completed.completed),
            },
            g.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    print_table(&["GROUP", "PATTERN", "DONE", "UPDATED"], rows);
    Ok(())
}

fn purge(root: &Path, db: &Path, group_id: &str, json: bool) -> anyhow::Result<()> {
    validate_ident(group_id)?;
    let mut store = open_store(root, db)?;
    let removed = store
        .purge_group(group_id)
        .with_context(|| format!("failed to purge group '{group_id}'"))?;

    if json {
        print_json(&serde_json::json!({ "group_id": group_id, "units_removed": removed }))?;
    } else {
        println!("Purged {group_id} ({removed} units)");
    }
    Ok(())
}

fn prune(root: &Path, db: &Path, days: u32, json: bool) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    let mut store = open_store(root, db)?;
    let pruned = store.prune_before(cutoff).context("failed to prune groups")?;

    if json {
        print_json(&serde_json::json!({ "pruned": pruned }))?;
    } else if pruned.is_empty() {
        println!("Nothing older than {days} days.");
    } else {
        for g in &pruned {
            println!("Pruned {g}");
        }
    }
    Ok(())
}
