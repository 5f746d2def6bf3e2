use crate::cmd::open_store;
use crate::output::{print_json, print_table};
use muster_core::io::one_line_preview;
use muster_core::manifest::StagePointer;
use muster_core::paths::validate_ident;
use std::path::Path;

pub fn run(root: &Path, db: &Path, group_id: &str, json: bool) -> anyhow::Result<()> {
    validate_ident(group_id)?;
    let store = open_store(root, db)?;
    let Some(group) = store.group(group_id)? else {
        anyhow::bail!("unknown group '{group_id}'");
    };
    let units = store.units(group_id)?;
    let counts = store.status_counts(group_id)?;
    let pointer = StagePointer::load(root, group_id)?;

    if json {
        print_json(&serde_json::json!({
            "group": group,
            "units": units,
            "counts": counts
                .iter()
                .map(|(status, n)| (status.as_str(), *n))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "pipeline": pointer,
        }))?;
        return Ok(());
    }

    let total = group
        .total_units
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!("Group:    {} ({})", group.group_id, group.kind);
    println!("Expected: {total} {}s", group.kind.worker_role());
    let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{n} {s}")).collect();
    println!("Units:    {}", if summary.is_empty() { "none".to_string() } else { summary.join(", ") });
    if let Some(ptr) = &pointer {
        println!(
            "Pipeline: stage {} of {} launched at {}",
            ptr.current_stage,
            ptr.total_stages,
            ptr.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    if units.is_empty() {
        return Ok(());
    }
    println!();
    let rows = units
        .iter()
        .map(|u| {
            vec![
                u.unit_id.clone(),
                u.role.to_string(),
                u.index.map(|i| i.to_string()).unwrap_or_default(),
                u.status.to_string(),
                u.completed_at
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default(),
                u.output
                    .as_deref()
                    .map(|o| one_line_preview(o, 40))
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["UNIT", "ROLE", "INDEX", "STATUS", "COMPLETED", "OUTPUT"], rows);
    Ok(())
}
