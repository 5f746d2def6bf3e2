use crate::error::{MusterError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const MUSTER_DIR: &str = ".muster";
pub const PIPELINES_DIR: &str = ".muster/pipelines";
pub const OUTPUTS_DIR: &str = ".muster/outputs";

pub const STORE_FILE: &str = ".muster/coordination.db";
pub const SETTINGS_FILE: &str = ".muster/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn muster_dir(root: &Path) -> PathBuf {
    root.join(MUSTER_DIR)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Recovery pointer for a pipeline run. `group_id` must already be validated.
pub fn pipeline_pointer(root: &Path, group_id: &str) -> PathBuf {
    root.join(PIPELINES_DIR).join(format!("{group_id}.json"))
}

/// Default directory for spawned stage output when a manifest names none.
pub fn outputs_dir(root: &Path, group_id: &str) -> PathBuf {
    root.join(OUTPUTS_DIR).join(group_id)
}

pub fn stage_output_file(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("stage-{index}.md"))
}

// ---------------------------------------------------------------------------
// Identifier grammar
// ---------------------------------------------------------------------------

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,128}$").unwrap())
}

/// True if `id` is safe to use as a group, unit, or agent identifier.
///
/// Identifiers end up in SQL parameters and file names, so dots, slashes and
/// whitespace are all rejected.
pub fn is_valid_ident(id: &str) -> bool {
    ident_re().is_match(id)
}

pub fn validate_ident(id: &str) -> Result<()> {
    if !is_valid_ident(id) {
        return Err(MusterError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_idents() {
        for id in [
            "h1",
            "pipeline_2024",
            "a1b2c3d4-e5f6-7890-abcd-ef1234567890",
            "MR-job_7",
            "0",
        ] {
            validate_ident(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_idents() {
        let long = "x".repeat(129);
        for id in [
            "",
            "../etc/passwd",
            "a/b",
            "has space",
            "semi;colon",
            "quote'",
            "dot.dot",
            long.as_str(),
        ] {
            assert!(validate_ident(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            store_path(root),
            PathBuf::from("/tmp/proj/.muster/coordination.db")
        );
        assert_eq!(
            pipeline_pointer(root, "run-1"),
            PathBuf::from("/tmp/proj/.muster/pipelines/run-1.json")
        );
        assert_eq!(
            stage_output_file(&outputs_dir(root, "run-1"), 2),
            PathBuf::from("/tmp/proj/.muster/outputs/run-1/stage-2.md")
        );
    }
}
