//! Per-pattern behaviour plugged into the one generic engine.
//!
//! Counting, blocking and releasing are identical across patterns. What
//! differs is how workers are named, what the release prompt asks for, and
//! whether a completion triggers follow-up work.

use std::path::Path;

use crate::config::{GroupConfig, Settings};
use crate::error::Result;
use crate::spawn::Spawner;
use crate::store::CoordStore;
use crate::types::{PatternKind, Role};
use crate::unit::{Progress, UnitSpec, WorkUnit};

pub mod hierarchy;
pub mod map_reduce;
pub mod pipeline;

/// Everything a pattern may touch after a unit completes.
pub struct AdvanceContext<'a> {
    pub root: &'a Path,
    pub cfg: &'a GroupConfig,
    pub store: &'a CoordStore,
    pub spawner: &'a dyn Spawner,
}

pub trait Pattern: Send + Sync {
    fn kind(&self) -> PatternKind;

    fn worker_role(&self) -> Role {
        self.kind().worker_role()
    }

    /// Singular noun for a worker, used in progress messages.
    fn worker_noun(&self) -> &'static str;

    /// Release prompt listing every completed worker, one `- ` line each.
    fn synthesis(&self, units: &[WorkUnit], progress: Progress) -> String;

    /// Hook run after `unit` has been marked completed. Returns an optional
    /// message to append to the caller's response.
    fn after_complete(
        &self,
        _ctx: &AdvanceContext<'_>,
        _unit: &UnitSpec,
        _progress: Progress,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

pub fn pattern_for(kind: PatternKind, settings: &Settings) -> Box<dyn Pattern> {
    match kind {
        PatternKind::Hierarchy => Box::new(hierarchy::Hierarchy),
        PatternKind::Pipeline => Box::new(pipeline::Pipeline {
            carry_forward_chars: settings.pipeline.carry_forward_chars,
        }),
        PatternKind::MapReduce => Box::new(map_reduce::MapReduce {
            preview_chars: settings.barrier.preview_chars,
        }),
    }
}

/// `"3 mappers"` / `"1 mapper"`.
pub fn count_noun(n: u32, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// One-line progress summary shared by every pattern.
pub fn progress_line(pattern: &dyn Pattern, progress: Progress) -> String {
    if progress.total == 0 {
        format!(
            "{} complete; total {} count not configured.",
            count_noun(progress.completed, pattern.worker_noun()),
            pattern.worker_noun()
        )
    } else {
        format!(
            "{}/{} {}s complete.",
            progress.completed,
            progress.total,
            pattern.worker_noun()
        )
    }
}
