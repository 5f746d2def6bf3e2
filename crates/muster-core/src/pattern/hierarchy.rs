use super::Pattern;
use crate::types::PatternKind;
use crate::unit::{Progress, WorkUnit};

/// A coordinator delegating to specialists and synthesizing their findings.
pub struct Hierarchy;

impl Pattern for Hierarchy {
    fn kind(&self) -> PatternKind {
        PatternKind::Hierarchy
    }

    fn worker_noun(&self) -> &'static str {
        "specialist"
    }

    fn synthesis(&self, units: &[WorkUnit], progress: Progress) -> String {
        let mut out = format!(
            "All {} specialists complete ({}/{}). Synthesize their findings into a final answer.\n\nCompleted specialists:",
            progress.total, progress.completed, progress.total
        );
        for unit in units {
            out.push_str("\n- ");
            out.push_str(&unit.label());
            if let Some(parent) = &unit.parent_id {
                out.push_str(&format!(" (reports to {parent})"));
            }
        }
        out
    }
}
