use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MusterError;

// ---------------------------------------------------------------------------
// PatternKind
// ---------------------------------------------------------------------------

/// The coordination pattern a group runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Hierarchy,
    Pipeline,
    MapReduce,
}

impl PatternKind {
    pub fn all() -> &'static [PatternKind] {
        &[
            PatternKind::Hierarchy,
            PatternKind::Pipeline,
            PatternKind::MapReduce,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Hierarchy => "hierarchy",
            PatternKind::Pipeline => "pipeline",
            PatternKind::MapReduce => "map_reduce",
        }
    }

    /// The role every non-aggregating participant of this pattern plays.
    pub fn worker_role(self) -> Role {
        match self {
            PatternKind::Hierarchy => Role::Specialist,
            PatternKind::Pipeline => Role::Stage,
            PatternKind::MapReduce => Role::Mapper,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatternKind {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hierarchy" | "hierarchical" => Ok(PatternKind::Hierarchy),
            "pipeline" => Ok(PatternKind::Pipeline),
            "map_reduce" | "map-reduce" | "mapreduce" => Ok(PatternKind::MapReduce),
            _ => Err(MusterError::InvalidPattern(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coordinator,
    Specialist,
    Stage,
    Mapper,
    Reducer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Specialist => "specialist",
            Role::Stage => "stage",
            Role::Mapper => "mapper",
            Role::Reducer => "reducer",
        }
    }

    /// Aggregators wait at the barrier; everyone else runs free.
    pub fn is_aggregator(self) -> bool {
        matches!(self, Role::Coordinator | Role::Reducer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" | "lead" => Ok(Role::Coordinator),
            "specialist" | "worker" => Ok(Role::Specialist),
            "stage" => Ok(Role::Stage),
            "mapper" => Ok(Role::Mapper),
            "reducer" => Ok(Role::Reducer),
            _ => Err(MusterError::InvalidRole(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// UnitStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a work unit.
///
/// Transitions: `Pending → Active → Completed`. The ordering is total and a
/// unit never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Active,
    Completed,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Active => "active",
            UnitStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UnitStatus::Pending),
            "active" => Ok(UnitStatus::Active),
            "completed" => Ok(UnitStatus::Completed),
            _ => Err(MusterError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_aliases_parse() {
        assert_eq!("hierarchical".parse::<PatternKind>().unwrap(), PatternKind::Hierarchy);
        assert_eq!("map-reduce".parse::<PatternKind>().unwrap(), PatternKind::MapReduce);
        assert_eq!("MapReduce".parse::<PatternKind>().unwrap(), PatternKind::MapReduce);
        assert_eq!("Pipeline".parse::<PatternKind>().unwrap(), PatternKind::Pipeline);
        assert!("swarm".parse::<PatternKind>().is_err());
    }

    #[test]
    fn worker_roles_per_pattern() {
        assert_eq!(PatternKind::Hierarchy.worker_role(), Role::Specialist);
        assert_eq!(PatternKind::Pipeline.worker_role(), Role::Stage);
        assert_eq!(PatternKind::MapReduce.worker_role(), Role::Mapper);
    }

    #[test]
    fn only_coordinator_and_reducer_aggregate() {
        assert!(Role::Coordinator.is_aggregator());
        assert!(Role::Reducer.is_aggregator());
        for role in [Role::Specialist, Role::Stage, Role::Mapper] {
            assert!(!role.is_aggregator(), "{role} must not be gated");
        }
    }

    #[test]
    fn status_order_is_monotonic() {
        assert!(UnitStatus::Pending < UnitStatus::Active);
        assert!(UnitStatus::Active < UnitStatus::Completed);
        assert_eq!(UnitStatus::Active.max(UnitStatus::Completed), UnitStatus::Completed);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&PatternKind::MapReduce).unwrap();
        assert_eq!(json, "\"map_reduce\"");
        let role: Role = serde_json::from_str("\"reducer\"").unwrap();
        assert_eq!(role, Role::Reducer);
    }
}
