//! Barrier decision for aggregator stop attempts.
//!
//! Stateless: every stop attempt re-reads the store and re-evaluates. The
//! caller's runtime re-invokes the stop hook after each block, so "waiting"
//! is nothing more than repeated evaluation.
//!
//! | progress                      | decision        | response |
//! |-------------------------------|-----------------|----------|
//! | total unset or 0              | `Indeterminate` | block    |
//! | completed < total             | `Waiting`       | block    |
//! | completed < total, timed out  | `TimedOut`      | continue |
//! | completed >= total > 0        | `Released`      | continue |
//!
//! `TimedOut` only occurs when a supervision timeout is configured.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::hook::HookResponse;
use crate::pattern::{count_noun, Pattern};
use crate::unit::{Progress, WorkUnit};

#[derive(Debug, Clone, PartialEq)]
pub enum BarrierDecision {
    Waiting {
        progress: Progress,
    },
    Indeterminate {
        progress: Progress,
    },
    Released {
        progress: Progress,
        units: Vec<WorkUnit>,
    },
    TimedOut {
        progress: Progress,
        units: Vec<WorkUnit>,
        waited: Duration,
    },
}

/// Decide whether an aggregator may stop.
///
/// `started_at` is the group's first registration; it is only consulted when
/// `timeout` is set.
pub fn evaluate(
    progress: Progress,
    units: Vec<WorkUnit>,
    started_at: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
    now: DateTime<Utc>,
) -> BarrierDecision {
    if progress.total == 0 {
        return BarrierDecision::Indeterminate { progress };
    }
    if progress.is_complete() {
        return BarrierDecision::Released { progress, units };
    }
    if let (Some(timeout), Some(started)) = (timeout, started_at) {
        let waited = (now - started).to_std().unwrap_or_default();
        if waited >= timeout {
            return BarrierDecision::TimedOut {
                progress,
                units,
                waited,
            };
        }
    }
    BarrierDecision::Waiting { progress }
}

impl BarrierDecision {
    pub fn is_released(&self) -> bool {
        matches!(self, BarrierDecision::Released { .. })
    }

    /// Render as a hook response using the pattern's vocabulary.
    pub fn into_response(self, pattern: &dyn Pattern) -> HookResponse {
        let noun = pattern.worker_noun();
        match self {
            BarrierDecision::Indeterminate { progress } => HookResponse::block(format!(
                "Cannot release: the total {noun} count is not configured (set MUSTER_TOTAL_UNITS). \
                 {} so far.",
                count_noun(progress.completed, &format!("completed {noun}"))
            )),
            BarrierDecision::Waiting { progress } => HookResponse::block(format!(
                "Waiting on {} of {} ({}/{} complete).",
                progress.remaining(),
                count_noun(progress.total, noun),
                progress.completed,
                progress.total
            )),
            BarrierDecision::Released { progress, units } => {
                HookResponse::proceed_with(pattern.synthesis(&units, progress))
            }
            BarrierDecision::TimedOut {
                progress,
                units,
                waited,
            } => HookResponse::proceed_with(format!(
                "Barrier timed out after {}s with {} still outstanding. Proceeding with partial results.\n\n{}",
                waited.as_secs(),
                count_noun(progress.remaining(), noun),
                pattern.synthesis(&units, progress)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::pattern::pattern_for;
    use crate::types::{PatternKind, Role, UnitStatus};

    fn done(i: u32) -> WorkUnit {
        WorkUnit {
            key: format!("h1:{i}"),
            group_id: "h1".into(),
            unit_id: i.to_string(),
            kind: PatternKind::Hierarchy,
            role: Role::Specialist,
            index: Some(i),
            parent_id: None,
            status: UnitStatus::Completed,
            output: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    fn hierarchy() -> Box<dyn Pattern> {
        pattern_for(PatternKind::Hierarchy, &Settings::default())
    }

    #[test]
    fn blocks_iff_incomplete() {
        for total in 1..=4u32 {
            for completed in 0..=total + 1 {
                let units = (0..completed).map(done).collect();
                let d = evaluate(Progress::new(completed, Some(total)), units, None, None, Utc::now());
                let resp = d.into_response(hierarchy().as_ref());
                assert_eq!(resp.is_block(), completed < total, "{completed}/{total}");
                assert!(resp.message.is_some());
            }
        }
    }

    #[test]
    fn waiting_message_names_remaining() {
        let d = evaluate(Progress::new(2, Some(3)), vec![done(0), done(1)], None, None, Utc::now());
        let resp = d.into_response(hierarchy().as_ref());
        assert_eq!(
            resp.message.as_deref(),
            Some("Waiting on 1 of 3 specialists (2/3 complete).")
        );
    }

    #[test]
    fn zero_total_never_releases() {
        for completed in [0, 1, 5] {
            for total in [None, Some(0)] {
                let d = evaluate(
                    Progress::new(completed, total),
                    vec![],
                    Some(Utc::now() - chrono::Duration::hours(5)),
                    Some(Duration::from_secs(1)),
                    Utc::now(),
                );
                assert!(matches!(d, BarrierDecision::Indeterminate { .. }));
                assert!(d.into_response(hierarchy().as_ref()).is_block());
            }
        }
    }

    #[test]
    fn released_lists_every_unit() {
        let units = vec![done(0), done(1), done(2)];
        let d = evaluate(Progress::new(3, Some(3)), units, None, None, Utc::now());
        assert!(d.is_released());
        let msg = d.into_response(hierarchy().as_ref()).message.unwrap();
        assert_eq!(msg.lines().filter(|l| l.starts_with("- ")).count(), 3);
    }

    #[test]
    fn timeout_is_opt_in() {
        let started = Some(Utc::now() - chrono::Duration::seconds(120));
        let progress = Progress::new(1, Some(3));

        let d = evaluate(progress, vec![done(0)], started, None, Utc::now());
        assert!(matches!(d, BarrierDecision::Waiting { .. }));

        let d = evaluate(progress, vec![done(0)], started, Some(Duration::from_secs(600)), Utc::now());
        assert!(matches!(d, BarrierDecision::Waiting { .. }));

        let d = evaluate(progress, vec![done(0)], started, Some(Duration::from_secs(60)), Utc::now());
        let resp = d.into_response(hierarchy().as_ref());
        assert!(!resp.is_block());
        let msg = resp.message.unwrap();
        assert!(msg.starts_with("Barrier timed out"));
        assert!(msg.contains("2 specialists still outstanding"));
    }
}
