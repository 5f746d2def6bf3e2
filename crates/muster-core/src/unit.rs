use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GroupConfig;
use crate::types::{PatternKind, Role, UnitStatus};

/// Identity and placement of a unit, as supplied to the registration API.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    pub group_id: String,
    pub kind: PatternKind,
    pub unit_id: String,
    pub role: Role,
    pub index: Option<u32>,
    pub parent_id: Option<String>,
}

impl UnitSpec {
    pub fn new(
        group_id: impl Into<String>,
        kind: PatternKind,
        unit_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            kind,
            unit_id: unit_id.into(),
            role,
            index: None,
            parent_id: None,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// The caller's own unit, if the config identifies one.
    pub fn own(cfg: &GroupConfig) -> Option<Self> {
        let unit_id = cfg.own_unit_id()?;
        Some(Self {
            group_id: cfg.group_id.clone(),
            kind: cfg.kind,
            unit_id,
            role: cfg.role,
            index: cfg.index,
            parent_id: cfg.parent_id.clone(),
        })
    }

    /// A subagent launched by the caller, counted as a worker of the pattern.
    pub fn subagent(cfg: &GroupConfig, agent_id: &str) -> Self {
        Self {
            group_id: cfg.group_id.clone(),
            kind: cfg.kind,
            unit_id: agent_id.to_string(),
            role: cfg.kind.worker_role(),
            index: None,
            parent_id: cfg.agent_id.clone(),
        }
    }

    pub fn key(&self) -> String {
        unit_key(&self.group_id, &self.unit_id)
    }
}

/// Display key of a work unit row. `:` is outside the identifier grammar,
/// so distinct (group, unit) pairs never share a key.
pub fn unit_key(group_id: &str, unit_id: &str) -> String {
    format!("{group_id}:{unit_id}")
}

/// One tracked participant of a coordination group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub key: String,
    pub group_id: String,
    pub unit_id: String,
    pub kind: PatternKind,
    pub role: Role,
    pub index: Option<u32>,
    pub parent_id: Option<String>,
    pub status: UnitStatus,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkUnit {
    /// Display label: `stage 2` for indexed units, the unit id otherwise.
    pub fn label(&self) -> String {
        match self.index {
            Some(i) => format!("{} {i}", self.role),
            None => format!("{} {}", self.role, self.unit_id),
        }
    }
}

/// Informational record of a group; the barrier never reads `total_units` from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationGroup {
    pub group_id: String,
    pub kind: PatternKind,
    pub total_units: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Completed-versus-expected counts for one group and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

impl Progress {
    pub fn new(completed: u32, total: Option<u32>) -> Self {
        Self {
            completed,
            total: total.unwrap_or(0),
        }
    }

    /// A zero total is indeterminate, never complete.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.completed)
    }
}

/// Outcome of a completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub progress: Progress,
    /// Set only for the call that moved the unit to completed; repeat
    /// deliveries of the same completion see `false`.
    pub newly_completed: bool,
}
