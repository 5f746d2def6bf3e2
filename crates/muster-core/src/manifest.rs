use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MusterError, Result};
use crate::io::{atomic_write, read_optional};
use crate::paths;

// ---------------------------------------------------------------------------
// StageManifest
// ---------------------------------------------------------------------------

/// Ordered stage definitions for one pipeline run. YAML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest {
    pub id: String,
    #[serde(default)]
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub stages: Vec<StageDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDef {
    /// Agent identity passed to the spawner; empty means the default agent.
    #[serde(default)]
    pub agent: String,
    pub prompt: String,
}

impl StageManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = read_optional(path)?
            .ok_or_else(|| MusterError::ManifestMissing(path.display().to_string()))?;
        // serde_yaml also accepts JSON documents.
        let manifest: Self = serde_yaml::from_str(&data)
            .map_err(|e| MusterError::ManifestInvalid(format!("{}: {e}", path.display())))?;
        if manifest.stages.is_empty() {
            return Err(MusterError::ManifestInvalid(format!(
                "{}: no stages defined",
                path.display()
            )));
        }
        Ok(manifest)
    }

    pub fn stage(&self, index: u32) -> Option<&StageDef> {
        self.stages.get(index as usize)
    }

    /// Where stage output files live: the manifest's `output_dir` (relative
    /// paths resolve against `root`), else `.muster/outputs/<group>`.
    pub fn resolve_output_dir(&self, root: &Path, group_id: &str) -> PathBuf {
        match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => paths::outputs_dir(root, group_id),
        }
    }
}

// ---------------------------------------------------------------------------
// StagePointer
// ---------------------------------------------------------------------------

/// Last stage launched for a pipeline run, kept for recovery and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePointer {
    pub group_id: String,
    pub current_stage: u32,
    pub total_stages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl StagePointer {
    pub fn load(root: &Path, group_id: &str) -> Result<Option<Self>> {
        paths::validate_ident(group_id)?;
        match read_optional(&paths::pipeline_pointer(root, group_id))? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        paths::validate_ident(&self.group_id)?;
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(
            &paths::pipeline_pointer(root, &self.group_id),
            data.as_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_yaml_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.yaml");
        std::fs::write(
            &path,
            "id: run-1\ntask: summarize\nstages:\n  - agent: researcher\n    prompt: Research it\n  - agent: writer\n    prompt: Write it\n",
        )
        .unwrap();
        let m = StageManifest::load(&path).unwrap();
        assert_eq!(m.stages.len(), 2);
        assert_eq!(m.stage(1).unwrap().agent, "writer");
        assert!(m.stage(2).is_none());
    }

    #[test]
    fn loads_json_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(
            &path,
            r#"{"id":"run-1","task":"t","output_dir":"out","stages":[{"agent":"a","prompt":"p"}]}"#,
        )
        .unwrap();
        let m = StageManifest::load(&path).unwrap();
        assert_eq!(
            m.resolve_output_dir(dir.path(), "run-1"),
            dir.path().join("out")
        );
    }

    #[test]
    fn missing_and_invalid_manifests() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            StageManifest::load(&dir.path().join("none.yaml")),
            Err(MusterError::ManifestMissing(_))
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "id: x\nstages: 7\n").unwrap();
        assert!(matches!(
            StageManifest::load(&bad),
            Err(MusterError::ManifestInvalid(_))
        ));

        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "id: x\nstages: []\n").unwrap();
        assert!(matches!(
            StageManifest::load(&empty),
            Err(MusterError::ManifestInvalid(_))
        ));
    }

    #[test]
    fn default_output_dir() {
        let m = StageManifest {
            id: "r".into(),
            task: String::new(),
            output_dir: None,
            stages: vec![],
        };
        assert_eq!(
            m.resolve_output_dir(Path::new("/p"), "g1"),
            PathBuf::from("/p/.muster/outputs/g1")
        );
    }

    #[test]
    fn pointer_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(StagePointer::load(dir.path(), "run-1").unwrap().is_none());
        let ptr = StagePointer {
            group_id: "run-1".into(),
            current_stage: 2,
            total_stages: 3,
            manifest: None,
            updated_at: Utc::now(),
        };
        ptr.save(dir.path()).unwrap();
        assert!(dir.path().join(".muster/pipelines/run-1.json").exists());
        assert_eq!(StagePointer::load(dir.path(), "run-1").unwrap(), Some(ptr));
    }
}
