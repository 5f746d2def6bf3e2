use super::Pattern;
use crate::io::one_line_preview;
use crate::types::PatternKind;
use crate::unit::{Progress, WorkUnit};

/// Parallel mappers whose outputs a reducer combines.
pub struct MapReduce {
    pub preview_chars: usize,
}

impl MapReduce {
    fn preview(&self, output: &str) -> String {
        one_line_preview(output, self.preview_chars)
    }
}

impl Pattern for MapReduce {
    fn kind(&self) -> PatternKind {
        PatternKind::MapReduce
    }

    fn worker_noun(&self) -> &'static str {
        "mapper"
    }

    fn synthesis(&self, units: &[WorkUnit], progress: Progress) -> String {
        let mut out = format!(
            "All {} mappers complete ({}/{}). Reduce their outputs into a single result.\n\nMapper outputs:",
            progress.total, progress.completed, progress.total
        );
        for unit in units {
            out.push_str("\n- ");
            out.push_str(&unit.label());
            match unit.output.as_deref() {
                Some(output) if !output.trim().is_empty() => {
                    out.push_str(": ");
                    out.push_str(&self.preview(output));
                }
                _ => out.push_str(": (no output recorded)"),
            }
        }
        out
    }
}
