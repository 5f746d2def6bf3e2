use anyhow::Context;
use muster_core::config::Settings;
use muster_core::store::CoordStore;
use std::path::Path;

pub mod config;
pub mod group;
pub mod hook;
pub mod progress;
pub mod status;
pub mod unit;

/// Open the coordination store with the project's busy timeout.
pub fn open_store(root: &Path, db: &Path) -> anyhow::Result<CoordStore> {
    let settings = Settings::load(root).context("failed to load .muster/config.yaml")?;
    CoordStore::open(db, settings.store.busy_timeout())
        .with_context(|| format!("failed to open coordination store at {}", db.display()))
}
