use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{AdvanceContext, Pattern};
use crate::error::{MusterError, Result};
use crate::io::{read_optional, truncate_chars};
use crate::manifest::{StageManifest, StagePointer};
use crate::paths;
use crate::spawn::SpawnRequest;
use crate::types::PatternKind;
use crate::unit::{Progress, UnitSpec, WorkUnit};

/// Sequential stages, each launched when its predecessor completes.
pub struct Pipeline {
    pub carry_forward_chars: usize,
}

impl Pipeline {
    /// Prompt for stage `index + 1`: the upstream output, then the template.
    pub fn carry_forward(&self, index: u32, previous: Option<&str>, template: &str) -> String {
        match previous.map(str::trim).filter(|p| !p.is_empty()) {
            Some(prev) => {
                let (cut, dropped) = truncate_chars(prev, self.carry_forward_chars);
                let marker = if dropped { "\n\n[output truncated]" } else { "" };
                format!("## Output from stage {index}\n\n{cut}{marker}\n\n---\n\n{template}")
            }
            None => template.to_string(),
        }
    }

    fn resolve_manifest(ctx: &AdvanceContext<'_>) -> Result<PathBuf> {
        let path = ctx.cfg.manifest_path.as_deref().ok_or_else(|| {
            MusterError::ManifestMissing("no manifest configured for this group".to_string())
        })?;
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            ctx.root.join(path)
        })
    }

    fn previous_output(
        ctx: &AdvanceContext<'_>,
        unit: &UnitSpec,
        output_dir: &Path,
        index: u32,
    ) -> Result<Option<String>> {
        let stored = ctx
            .store
            .unit(&unit.group_id, &unit.unit_id)?
            .and_then(|u| u.output);
        match stored {
            Some(out) => Ok(Some(out)),
            None => read_optional(&paths::stage_output_file(output_dir, index)),
        }
    }

    /// Launch stage `next` and record the pointer. Returns the progress message.
    fn advance(
        &self,
        ctx: &AdvanceContext<'_>,
        unit: &UnitSpec,
        index: u32,
        total: u32,
    ) -> Result<String> {
        let next = index + 1;
        let manifest_path = Self::resolve_manifest(ctx)?;
        let manifest = StageManifest::load(&manifest_path)?;
        let stage = manifest
            .stage(next)
            .ok_or_else(|| MusterError::StageMissing {
                index: next,
                manifest: manifest_path.display().to_string(),
            })?;
        if manifest.stages.len() != total as usize {
            tracing::warn!(
                group = %unit.group_id,
                manifest_stages = manifest.stages.len(),
                total,
                "manifest stage count differs from configured total"
            );
        }

        let output_dir = manifest.resolve_output_dir(ctx.root, &unit.group_id);
        let previous = Self::previous_output(ctx, unit, &output_dir, index)?;
        let prompt = self.carry_forward(index, previous.as_deref(), &stage.prompt);

        let req = SpawnRequest {
            group_id: unit.group_id.clone(),
            stage_index: next,
            total_stages: total,
            agent: Some(stage.agent.clone()).filter(|a| !a.is_empty()),
            prompt,
            manifest_path: manifest_path.clone(),
            output_file: paths::stage_output_file(&output_dir, next),
            parent_id: ctx.cfg.agent_id.clone(),
        };
        ctx.spawner.spawn(&req)?;

        StagePointer {
            group_id: unit.group_id.clone(),
            current_stage: next,
            total_stages: total,
            manifest: Some(manifest_path),
            updated_at: Utc::now(),
        }
        .save(ctx.root)?;

        let agent = if stage.agent.is_empty() {
            "default agent"
        } else {
            stage.agent.as_str()
        };
        Ok(format!(
            "Stage {index} complete. Launched stage {next} of {total} ({agent})."
        ))
    }
}

impl Pattern for Pipeline {
    fn kind(&self) -> PatternKind {
        PatternKind::Pipeline
    }

    fn worker_noun(&self) -> &'static str {
        "stage"
    }

    fn synthesis(&self, units: &[WorkUnit], progress: Progress) -> String {
        let mut out = format!(
            "All {} stages complete ({}/{}). Review the final stage output and report the result.\n\nCompleted stages:",
            progress.total, progress.completed, progress.total
        );
        for unit in units {
            out.push_str("\n- ");
            out.push_str(&unit.label());
        }
        out
    }

    fn after_complete(
        &self,
        ctx: &AdvanceContext<'_>,
        unit: &UnitSpec,
        progress: Progress,
    ) -> Result<Option<String>> {
        let Some(index) = unit.index else {
            return Ok(None);
        };
        let total = match ctx.cfg.total_units {
            Some(t) if t > 0 => t,
            _ => {
                return Ok(Some(format!(
                    "Stage {index} complete. Total stage count not configured; auto-advance disabled."
                )))
            }
        };
        if index + 1 >= total {
            return Ok(Some(format!(
                "Pipeline complete: final stage {index} finished ({}/{total} stages).",
                progress.completed
            )));
        }

        match self.advance(ctx, unit, index, total) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                if matches!(e, MusterError::ManifestMissing(_)) {
                    tracing::debug!(group = %unit.group_id, error = %e, "no manifest; manual mode");
                } else {
                    tracing::warn!(group = %unit.group_id, error = %e, "auto-advance failed; manual mode");
                }
                Ok(Some(format!(
                    "Stage {index} complete ({}/{total}). Manual mode: start stage {} yourself ({e}).",
                    progress.completed,
                    index + 1
                )))
            }
        }
    }
}
