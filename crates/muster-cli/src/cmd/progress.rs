use crate::cmd::open_store;
use crate::output::print_json;
use muster_core::types::Role;
use std::path::Path;

pub fn run(
    root: &Path,
    db: &Path,
    group_id: &str,
    role: Option<&str>,
    total: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(root, db)?;
    let group = store.group(group_id)?;

    let role: Role = match (role, &group) {
        (Some(r), _) => r.parse()?,
        (None, Some(g)) => g.kind.worker_role(),
        (None, None) => anyhow::bail!("unknown group '{group_id}'; pass --role to count anyway"),
    };
    // Fall back to the recorded total for display only.
    let total = total.or_else(|| group.as_ref().and_then(|g| g.total_units));
    let progress = store.progress(group_id, role, total)?;

    if json {
        print_json(&serde_json::json!({
            "group_id": group_id,
            "role": role,
            "completed": progress.completed,
            "total": progress.total,
            "remaining": progress.remaining(),
            "all_complete": progress.is_complete(),
        }))?;
    } else if progress.total == 0 {
        println!("{group_id}: {} {role} completed (total unknown)", progress.completed);
    } else {
        println!(
            "{group_id}: {}/{} {role} completed, {} remaining",
            progress.completed,
            progress.total,
            progress.remaining()
        );
    }
    Ok(())
}
