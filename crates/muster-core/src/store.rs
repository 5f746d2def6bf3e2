//! Persistent coordination store backed by SQLite.
//!
//! # Table design
//!
//! ```text
//! work_units            one row per unit, keyed by (group_id, unit_id)
//! coordination_groups   one informational row per group
//! schema_version        migration bookkeeping
//! ```
//!
//! Every hook invocation is a fresh process with its own connection, so the
//! store is the only shared state. Writers take `BEGIN IMMEDIATE` so the
//! write lock is acquired up front (waiting at most `busy_timeout`), and
//! `complete_unit` recounts inside the same transaction as its write.
//! Status only moves forward and `output` is write-once; both rules live in
//! the SQL upserts so they hold across processes. A completed row also keeps
//! its role, so it cannot leave the barrier count it was counted in.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::{MusterError, Result};
use crate::paths::validate_ident;
use crate::types::{PatternKind, Role, UnitStatus};
use crate::unit::{Completion, CoordinationGroup, Progress, UnitSpec, WorkUnit};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS coordination_groups (
    group_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    total_units INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_units (
    id TEXT NOT NULL UNIQUE,
    group_id TEXT NOT NULL,
    unit_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    role TEXT NOT NULL,
    unit_index INTEGER,
    parent_id TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    output TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    PRIMARY KEY (group_id, unit_id)
);

CREATE INDEX IF NOT EXISTS idx_work_units_group_status ON work_units(group_id, status);
"#;

const UNIT_COLUMNS: &str = "id, group_id, unit_id, kind, role, unit_index, parent_id, status, \
                            output, created_at, completed_at";

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so string order equals time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MusterError::MalformedRow(format!("timestamp '{s}': {e}")))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct UnitRow {
    id: String,
    group_id: String,
    unit_id: String,
    kind: String,
    role: String,
    unit_index: Option<u32>,
    parent_id: Option<String>,
    status: String,
    output: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl UnitRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            unit_id: row.get(2)?,
            kind: row.get(3)?,
            role: row.get(4)?,
            unit_index: row.get(5)?,
            parent_id: row.get(6)?,
            status: row.get(7)?,
            output: row.get(8)?,
            created_at: row.get(9)?,
            completed_at: row.get(10)?,
        })
    }

    fn into_unit(self) -> Result<WorkUnit> {
        Ok(WorkUnit {
            key: self.id,
            group_id: self.group_id,
            unit_id: self.unit_id,
            kind: self.kind.parse()?,
            role: self.role.parse()?,
            index: self.unit_index,
            parent_id: self.parent_id,
            status: self.status.parse()?,
            output: self.output,
            created_at: parse_ts(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

struct GroupRow {
    group_id: String,
    kind: String,
    total_units: Option<u32>,
    created_at: String,
    updated_at: String,
}

impl GroupRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            group_id: row.get(0)?,
            kind: row.get(1)?,
            total_units: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_group(self) -> Result<CoordinationGroup> {
        Ok(CoordinationGroup {
            group_id: self.group_id,
            kind: self.kind.parse()?,
            total_units: self.total_units,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn collect_units<I>(rows: I) -> Result<Vec<WorkUnit>>
where
    I: Iterator<Item = rusqlite::Result<UnitRow>>,
{
    rows.map(|r| r.map_err(MusterError::from).and_then(UnitRow::into_unit))
        .collect()
}

fn validate_spec(unit: &UnitSpec) -> Result<()> {
    validate_ident(&unit.group_id)?;
    validate_ident(&unit.unit_id)?;
    if let Some(parent) = &unit.parent_id {
        validate_ident(parent)?;
    }
    Ok(())
}

fn upsert_group(
    conn: &Connection,
    group_id: &str,
    kind: PatternKind,
    total: Option<u32>,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO coordination_groups (group_id, kind, total_units, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(group_id) DO UPDATE SET
             total_units = COALESCE(excluded.total_units, coordination_groups.total_units),
             updated_at = excluded.updated_at",
        params![group_id, kind.as_str(), total, now],
    )?;
    Ok(())
}

fn count_completed(conn: &Connection, group_id: &str, role: Role) -> Result<u32> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM work_units
         WHERE group_id = ?1 AND role = ?2 AND status = 'completed'",
        params![group_id, role.as_str()],
        |row| row.get(0),
    )?;
    Ok(n)
}

// ---------------------------------------------------------------------------
// CoordStore
// ---------------------------------------------------------------------------

/// A single connection to the coordination database.
pub struct CoordStore {
    conn: Connection,
}

impl CoordStore {
    /// Open or create the database at `path`.
    ///
    /// Sets the busy timeout before anything else so that WAL switching and
    /// first-use schema creation wait for concurrent openers instead of
    /// failing.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        )?;
        let current: i32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        if current < 1 {
            tx.execute_batch(SCHEMA_V1)?;
            tx.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Record that a unit has started.
    ///
    /// Idempotent upsert: a repeat registration refreshes role, index and
    /// parent, but a unit that already completed keeps its status and role.
    /// `total` is only recorded on the group row for display.
    pub fn register_unit(&mut self, unit: &UnitSpec, total: Option<u32>) -> Result<()> {
        validate_spec(unit)?;
        let now = ts(Utc::now());
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        upsert_group(&tx, &unit.group_id, unit.kind, total, &now)?;
        tx.execute(
            "INSERT INTO work_units
                 (id, group_id, unit_id, kind, role, unit_index, parent_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8)
             ON CONFLICT(group_id, unit_id) DO UPDATE SET
                 role = CASE WHEN work_units.status = 'completed'
                             THEN work_units.role
                             ELSE excluded.role END,
                 unit_index = COALESCE(excluded.unit_index, work_units.unit_index),
                 parent_id = COALESCE(excluded.parent_id, work_units.parent_id),
                 status = CASE WHEN work_units.status = 'completed'
                               THEN work_units.status
                               ELSE excluded.status END",
            params![
                unit.key(),
                unit.group_id,
                unit.unit_id,
                unit.kind.as_str(),
                unit.role.as_str(),
                unit.index,
                unit.parent_id,
                now,
            ],
        )?;
        tx.commit()?;
        tracing::debug!(group = %unit.group_id, unit = %unit.unit_id, role = %unit.role, "unit registered");
        Ok(())
    }

    /// Mark a unit completed and return fresh counts for its group and role.
    ///
    /// Creates the unit if it was never registered. Completing twice is a
    /// no-op; the first non-empty `output` is kept. The completing call's role
    /// wins over the one recorded at registration. Only the call that moved
    /// the unit to completed gets `newly_completed`.
    pub fn complete_unit(
        &mut self,
        unit: &UnitSpec,
        output: Option<&str>,
        total: Option<u32>,
    ) -> Result<Completion> {
        validate_spec(unit)?;
        let now = ts(Utc::now());
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        upsert_group(&tx, &unit.group_id, unit.kind, total, &now)?;
        let previous: Option<String> = tx
            .query_row(
                "SELECT status FROM work_units WHERE group_id = ?1 AND unit_id = ?2",
                params![unit.group_id, unit.unit_id],
                |row| row.get(0),
            )
            .optional()?;
        let newly_completed = previous.as_deref() != Some(UnitStatus::Completed.as_str());
        tx.execute(
            "INSERT INTO work_units
                 (id, group_id, unit_id, kind, role, unit_index, parent_id, status,
                  output, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'completed', ?8, ?9, ?9)
             ON CONFLICT(group_id, unit_id) DO UPDATE SET
                 role = CASE WHEN work_units.status = 'completed'
                             THEN work_units.role
                             ELSE excluded.role END,
                 status = 'completed',
                 unit_index = COALESCE(work_units.unit_index, excluded.unit_index),
                 parent_id = COALESCE(work_units.parent_id, excluded.parent_id),
                 output = COALESCE(work_units.output, excluded.output),
                 completed_at = COALESCE(work_units.completed_at, excluded.completed_at)",
            params![
                unit.key(),
                unit.group_id,
                unit.unit_id,
                unit.kind.as_str(),
                unit.role.as_str(),
                unit.index,
                unit.parent_id,
                output.filter(|o| !o.is_empty()),
                now,
            ],
        )?;
        let counted_role: String = tx.query_row(
            "SELECT role FROM work_units WHERE group_id = ?1 AND unit_id = ?2",
            params![unit.group_id, unit.unit_id],
            |row| row.get(0),
        )?;
        let counted_role: Role = counted_role.parse()?;
        let completed = count_completed(&tx, &unit.group_id, counted_role)?;
        tx.commit()?;
        let progress = Progress::new(completed, total);
        tracing::debug!(
            group = %unit.group_id,
            unit = %unit.unit_id,
            completed = progress.completed,
            total = progress.total,
            newly_completed,
            "unit completed"
        );
        Ok(Completion {
            progress,
            newly_completed,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Completed units of `role` in `group_id` against the caller's `total`.
    pub fn progress(&self, group_id: &str, role: Role, total: Option<u32>) -> Result<Progress> {
        let completed = count_completed(&self.conn, group_id, role)?;
        Ok(Progress::new(completed, total))
    }

    /// Completed units ordered by index, then completion time.
    pub fn completed_units(&self, group_id: &str, role: Role) -> Result<Vec<WorkUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM work_units
             WHERE group_id = ?1 AND role = ?2 AND status = 'completed'
             ORDER BY unit_index IS NULL, unit_index, completed_at, unit_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![group_id, role.as_str()], UnitRow::read)?;
        collect_units(rows)
    }

    /// Every unit of a group, in creation order.
    pub fn units(&self, group_id: &str) -> Result<Vec<WorkUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM work_units
             WHERE group_id = ?1
             ORDER BY created_at, unit_index IS NULL, unit_index, unit_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![group_id], UnitRow::read)?;
        collect_units(rows)
    }

    pub fn unit(&self, group_id: &str, unit_id: &str) -> Result<Option<WorkUnit>> {
        let sql = format!(
            "SELECT {UNIT_COLUMNS} FROM work_units WHERE group_id = ?1 AND unit_id = ?2"
        );
        let row = self
            .conn
            .query_row(&sql, params![group_id, unit_id], UnitRow::read)
            .optional()?;
        row.map(UnitRow::into_unit).transpose()
    }

    pub fn group(&self, group_id: &str) -> Result<Option<CoordinationGroup>> {
        let row = self
            .conn
            .query_row(
                "SELECT group_id, kind, total_units, created_at, updated_at
                 FROM coordination_groups WHERE group_id = ?1",
                params![group_id],
                GroupRow::read,
            )
            .optional()?;
        row.map(GroupRow::into_group).transpose()
    }

    /// All groups, most recently active first.
    pub fn groups(&self) -> Result<Vec<CoordinationGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, kind, total_units, created_at, updated_at
             FROM coordination_groups ORDER BY updated_at DESC, group_id",
        )?;
        let rows = stmt.query_map([], GroupRow::read)?;
        let groups = rows
            .map(|r| r.map_err(MusterError::from).and_then(GroupRow::into_group))
            .collect();
        groups
    }

    /// Earliest registration time of any unit in the group.
    pub fn group_started_at(&self, group_id: &str) -> Result<Option<DateTime<Utc>>> {
        let first: Option<String> = self.conn.query_row(
            "SELECT MIN(created_at) FROM work_units WHERE group_id = ?1",
            params![group_id],
            |row| row.get(0),
        )?;
        first.as_deref().map(parse_ts).transpose()
    }

    /// Count units of a group by status, for status displays.
    pub fn status_counts(&self, group_id: &str) -> Result<Vec<(UnitStatus, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM work_units WHERE group_id = ?1
             GROUP BY status ORDER BY status",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let counts = rows
            .map(|r| -> Result<(UnitStatus, u32)> {
                let (status, n) = r?;
                Ok((status.parse()?, n))
            })
            .collect();
        counts
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Delete a group and all of its units. Returns the number of units removed.
    pub fn purge_group(&mut self, group_id: &str) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM work_units WHERE group_id = ?1",
            params![group_id],
        )?;
        tx.execute(
            "DELETE FROM coordination_groups WHERE group_id = ?1",
            params![group_id],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Delete every group whose last activity is older than `cutoff`.
    /// Returns the ids of the removed groups.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = ts(cutoff);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stale: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT group_id FROM coordination_groups WHERE updated_at < ?1 ORDER BY group_id",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for group_id in &stale {
            tx.execute(
                "DELETE FROM work_units WHERE group_id = ?1",
                params![group_id],
            )?;
            tx.execute(
                "DELETE FROM coordination_groups WHERE group_id = ?1",
                params![group_id],
            )?;
        }
        tx.commit()?;
        Ok(stale)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, CoordStore) {
        let dir = TempDir::new().unwrap();
        let store = CoordStore::open(&dir.path().join("coord.db"), Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    fn mapper(group: &str, index: u32) -> UnitSpec {
        UnitSpec::new(group, PatternKind::MapReduce, index.to_string(), Role::Mapper)
            .with_index(index)
    }

    #[test]
    fn register_then_complete() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        store.register_unit(&unit, Some(2)).unwrap();

        let loaded = store.unit("mr1", "0").unwrap().unwrap();
        assert_eq!(loaded.status, UnitStatus::Active);
        assert!(loaded.completed_at.is_none());

        let done = store.complete_unit(&unit, Some("result"), Some(2)).unwrap();
        assert_eq!(done.progress, Progress { completed: 1, total: 2 });
        assert!(done.newly_completed);

        let loaded = store.unit("mr1", "0").unwrap().unwrap();
        assert_eq!(loaded.status, UnitStatus::Completed);
        assert_eq!(loaded.output.as_deref(), Some("result"));
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn completion_is_idempotent() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        let first = store.complete_unit(&unit, Some("a"), Some(3)).unwrap();
        let first_row = store.unit("mr1", "0").unwrap().unwrap();
        let second = store.complete_unit(&unit, Some("a"), Some(3)).unwrap();
        let second_row = store.unit("mr1", "0").unwrap().unwrap();

        assert_eq!(first.progress, second.progress);
        assert!(first.newly_completed);
        assert!(!second.newly_completed);
        assert_eq!(first_row, second_row);
    }

    #[test]
    fn registered_unit_is_newly_completed_once() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        store.register_unit(&unit, Some(1)).unwrap();
        assert!(store.complete_unit(&unit, None, Some(1)).unwrap().newly_completed);
        store.register_unit(&unit, Some(1)).unwrap();
        assert!(!store.complete_unit(&unit, None, Some(1)).unwrap().newly_completed);
    }

    #[test]
    fn underscore_ids_stay_in_their_own_group() {
        let (_dir, mut store) = open_tmp();
        let a = UnitSpec::new("run", PatternKind::Pipeline, "1_x", Role::Stage);
        let b = UnitSpec::new("run_1", PatternKind::Pipeline, "x", Role::Stage);
        store.complete_unit(&a, Some("from run"), Some(1)).unwrap();
        let done = store.complete_unit(&b, Some("from run_1"), Some(1)).unwrap();

        assert!(done.newly_completed);
        assert_eq!(done.progress, Progress { completed: 1, total: 1 });
        assert_eq!(store.progress("run", Role::Stage, Some(1)).unwrap().completed, 1);
        let a_row = store.unit("run", "1_x").unwrap().unwrap();
        let b_row = store.unit("run_1", "x").unwrap().unwrap();
        assert_eq!(a_row.output.as_deref(), Some("from run"));
        assert_eq!(b_row.output.as_deref(), Some("from run_1"));
        assert_ne!(a_row.key, b_row.key);
    }

    #[test]
    fn completion_role_replaces_registered_role() {
        let (_dir, mut store) = open_tmp();
        let registered = UnitSpec::new("h1", PatternKind::Hierarchy, "lead", Role::Specialist);
        store.register_unit(&registered, Some(1)).unwrap();
        let completed = UnitSpec::new("h1", PatternKind::Hierarchy, "lead", Role::Coordinator);
        let done = store.complete_unit(&completed, None, None).unwrap();

        assert_eq!(done.progress.completed, 1);
        assert_eq!(store.unit("h1", "lead").unwrap().unwrap().role, Role::Coordinator);
        assert_eq!(store.progress("h1", Role::Specialist, Some(1)).unwrap().completed, 0);
        assert_eq!(store.progress("h1", Role::Coordinator, None).unwrap().completed, 1);
    }

    #[test]
    fn late_registration_keeps_completed_role() {
        let (_dir, mut store) = open_tmp();
        let unit = UnitSpec::new("h1", PatternKind::Hierarchy, "spec-a", Role::Specialist);
        store.complete_unit(&unit, Some("done"), Some(1)).unwrap();
        let late = UnitSpec::new("h1", PatternKind::Hierarchy, "spec-a", Role::Coordinator);
        store.register_unit(&late, Some(1)).unwrap();
        // A repeat completion under another role does not move it either.
        let dup = store.complete_unit(&late, None, Some(1)).unwrap();

        assert!(!dup.newly_completed);
        assert_eq!(dup.progress.completed, 1);
        assert_eq!(store.unit("h1", "spec-a").unwrap().unwrap().role, Role::Specialist);
        assert!(store.progress("h1", Role::Specialist, Some(1)).unwrap().is_complete());
    }

    #[test]
    fn output_is_write_once() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        store.complete_unit(&unit, Some("first"), Some(1)).unwrap();
        store.complete_unit(&unit, Some("second"), Some(1)).unwrap();
        let loaded = store.unit("mr1", "0").unwrap().unwrap();
        assert_eq!(loaded.output.as_deref(), Some("first"));
    }

    #[test]
    fn late_output_fills_empty_slot() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        store.complete_unit(&unit, None, Some(1)).unwrap();
        store.complete_unit(&unit, Some("late"), Some(1)).unwrap();
        let loaded = store.unit("mr1", "0").unwrap().unwrap();
        assert_eq!(loaded.output.as_deref(), Some("late"));
    }

    #[test]
    fn registration_never_downgrades_completed() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 0);
        store.complete_unit(&unit, Some("done"), Some(1)).unwrap();
        store.register_unit(&unit, Some(1)).unwrap();

        let loaded = store.unit("mr1", "0").unwrap().unwrap();
        assert_eq!(loaded.status, UnitStatus::Completed);
        assert_eq!(loaded.output.as_deref(), Some("done"));
        assert_eq!(store.progress("mr1", Role::Mapper, Some(1)).unwrap().completed, 1);
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let (_dir, mut store) = open_tmp();
        let unit = UnitSpec::new("h1", PatternKind::Hierarchy, "agent-a", Role::Specialist);
        store.register_unit(&unit, None).unwrap();
        store
            .register_unit(&unit.clone().with_parent("lead"), None)
            .unwrap();
        let units = store.units("h1").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].parent_id.as_deref(), Some("lead"));
    }

    #[test]
    fn unregistered_completion_creates_row() {
        let (_dir, mut store) = open_tmp();
        let unit = mapper("mr1", 4);
        store.complete_unit(&unit, Some("out"), Some(5)).unwrap();
        let loaded = store.unit("mr1", "4").unwrap().unwrap();
        assert_eq!(loaded.status, UnitStatus::Completed);
        assert_eq!(loaded.index, Some(4));
        assert_eq!(store.progress("mr1", Role::Mapper, Some(5)).unwrap().completed, 1);
    }

    #[test]
    fn progress_counts_only_matching_role_and_group() {
        let (_dir, mut store) = open_tmp();
        store.complete_unit(&mapper("mr1", 0), None, Some(2)).unwrap();
        store.complete_unit(&mapper("mr2", 0), None, Some(2)).unwrap();
        store
            .complete_unit(
                &UnitSpec::new("mr1", PatternKind::MapReduce, "reducer", Role::Reducer),
                None,
                None,
            )
            .unwrap();
        store.register_unit(&mapper("mr1", 1), Some(2)).unwrap();

        let p = store.progress("mr1", Role::Mapper, Some(2)).unwrap();
        assert_eq!(p, Progress { completed: 1, total: 2 });
    }

    #[test]
    fn total_comes_from_caller_not_rows() {
        let (_dir, mut store) = open_tmp();
        store.complete_unit(&mapper("mr1", 0), None, Some(3)).unwrap();
        store.complete_unit(&mapper("mr1", 1), None, Some(3)).unwrap();
        let p = store.progress("mr1", Role::Mapper, Some(3)).unwrap();
        assert_eq!(p.total, 3);
        assert!(!p.is_complete());
        let unset = store.progress("mr1", Role::Mapper, None).unwrap();
        assert_eq!(unset.total, 0);
        assert!(!unset.is_complete());
    }

    #[test]
    fn completed_units_are_ordered_by_index() {
        let (_dir, mut store) = open_tmp();
        for i in [2, 0, 1] {
            store.complete_unit(&mapper("mr1", i), None, Some(3)).unwrap();
        }
        let units = store.completed_units("mr1", Role::Mapper).unwrap();
        let order: Vec<_> = units.iter().map(|u| u.index.unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn invalid_identifiers_rejected_without_write() {
        let (_dir, mut store) = open_tmp();
        let bad = UnitSpec::new("../etc", PatternKind::Pipeline, "0", Role::Stage);
        assert!(matches!(
            store.register_unit(&bad, None),
            Err(MusterError::InvalidIdentifier(_))
        ));
        let bad_unit = UnitSpec::new("p1", PatternKind::Pipeline, "a b", Role::Stage);
        assert!(store.complete_unit(&bad_unit, None, None).is_err());
        assert!(store.groups().unwrap().is_empty());
    }

    #[test]
    fn group_row_tracks_total() {
        let (_dir, mut store) = open_tmp();
        store.register_unit(&mapper("mr1", 0), None).unwrap();
        assert_eq!(store.group("mr1").unwrap().unwrap().total_units, None);
        store.register_unit(&mapper("mr1", 1), Some(4)).unwrap();
        store.register_unit(&mapper("mr1", 2), None).unwrap();
        let group = store.group("mr1").unwrap().unwrap();
        assert_eq!(group.total_units, Some(4));
        assert_eq!(group.kind, PatternKind::MapReduce);
    }

    #[test]
    fn purge_removes_group() {
        let (_dir, mut store) = open_tmp();
        store.register_unit(&mapper("mr1", 0), None).unwrap();
        store.register_unit(&mapper("mr1", 1), None).unwrap();
        store.register_unit(&mapper("keep", 0), None).unwrap();
        assert_eq!(store.purge_group("mr1").unwrap(), 2);
        assert!(store.group("mr1").unwrap().is_none());
        assert!(store.units("mr1").unwrap().is_empty());
        assert!(store.group("keep").unwrap().is_some());
    }

    #[test]
    fn prune_before_cutoff() {
        let (_dir, mut store) = open_tmp();
        store.register_unit(&mapper("old", 0), None).unwrap();
        let pruned = store
            .prune_before(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(pruned, vec!["old".to_string()]);
        assert!(store.groups().unwrap().is_empty());

        store.register_unit(&mapper("fresh", 0), None).unwrap();
        let pruned = store
            .prune_before(Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert!(pruned.is_empty());
    }

    #[test]
    fn group_started_at_is_earliest_row() {
        let (_dir, mut store) = open_tmp();
        assert!(store.group_started_at("mr1").unwrap().is_none());
        store.register_unit(&mapper("mr1", 0), None).unwrap();
        let first = store.group_started_at("mr1").unwrap().unwrap();
        store.register_unit(&mapper("mr1", 1), None).unwrap();
        assert_eq!(store.group_started_at("mr1").unwrap().unwrap(), first);
    }

    #[test]
    fn status_counts_group_by_status() {
        let (_dir, mut store) = open_tmp();
        store.register_unit(&mapper("mr1", 0), None).unwrap();
        store.register_unit(&mapper("mr1", 1), None).unwrap();
        store.complete_unit(&mapper("mr1", 1), None, None).unwrap();
        let counts = store.status_counts("mr1").unwrap();
        assert!(counts.contains(&(UnitStatus::Active, 1)));
        assert!(counts.contains(&(UnitStatus::Completed, 1)));
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/coord.db");
        {
            let mut store = CoordStore::open(&path, Duration::from_secs(5)).unwrap();
            store.register_unit(&mapper("mr1", 0), None).unwrap();
        }
        let store = CoordStore::open(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(store.units("mr1").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_completions_from_separate_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coord.db");
        CoordStore::open(&path, Duration::from_secs(5)).unwrap();

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut store = CoordStore::open(&path, Duration::from_secs(10)).unwrap();
                    let unit = mapper("race", i);
                    store.register_unit(&unit, Some(8)).unwrap();
                    // Duplicate delivery of the same stop event.
                    store
                        .complete_unit(&unit, Some(&format!("out-{i}")), Some(8))
                        .unwrap();
                    store
                        .complete_unit(&unit, Some("dup"), Some(8))
                        .unwrap()
                })
            })
            .collect();

        let mut max_seen = 0;
        for h in handles {
            let done = h.join().unwrap();
            assert!(!done.newly_completed);
            let p = done.progress;
            assert!(p.completed >= 1 && p.completed <= 8);
            max_seen = max_seen.max(p.completed);
        }
        assert_eq!(max_seen, 8);

        let store = CoordStore::open(&path, Duration::from_secs(5)).unwrap();
        let p = store.progress("race", Role::Mapper, Some(8)).unwrap();
        assert!(p.is_complete());
        for unit in store.completed_units("race", Role::Mapper).unwrap() {
            let i = unit.index.unwrap();
            assert_eq!(unit.output, Some(format!("out-{i}")));
        }
    }
}
