//! One engine for every pattern: maps a lifecycle event plus the caller's
//! group configuration onto store operations and a hook response.
//!
//! `dispatch` never fails. Anything that goes wrong below it is logged and
//! turned into a plain `continue`, so coordination can never stop an agent
//! from finishing its turn. The only way to get a `block` is an aggregator
//! whose barrier is verifiably not yet satisfied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::barrier;
use crate::config::{GroupConfig, Settings};
use crate::error::Result;
use crate::hook::{HookEvent, HookKind, HookResponse};
use crate::paths::is_valid_ident;
use crate::pattern::{pattern_for, progress_line, AdvanceContext, Pattern};
use crate::spawn::Spawner;
use crate::store::CoordStore;
use crate::unit::{Completion, UnitSpec};

/// Tool names that launch a subagent.
const SUBAGENT_TOOLS: &[&str] = &["Task", "Agent"];

pub struct Engine<'a> {
    root: PathBuf,
    store_path: PathBuf,
    settings: Settings,
    spawner: &'a dyn Spawner,
}

impl<'a> Engine<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        store_path: impl Into<PathBuf>,
        settings: Settings,
        spawner: &'a dyn Spawner,
    ) -> Self {
        Self {
            root: root.into(),
            store_path: store_path.into(),
            settings,
            spawner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle one lifecycle event.
    pub fn dispatch(
        &self,
        kind: HookKind,
        cfg: Option<&GroupConfig>,
        event: &HookEvent,
    ) -> HookResponse {
        let Some(cfg) = cfg else {
            return HookResponse::proceed();
        };
        if !cfg.is_valid() {
            tracing::debug!(group = %cfg.group_id, "group config fails identifier grammar; ignoring");
            return HookResponse::proceed();
        }
        if kind == HookKind::Stop && event.stop_hook_active {
            tracing::debug!(group = %cfg.group_id, "stop hook already active; not re-entering barrier");
            return HookResponse::proceed();
        }

        match self.handle(kind, cfg, event) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(
                    group = %cfg.group_id,
                    hook = %kind,
                    role = %cfg.role,
                    error = %e,
                    "coordination failed; continuing"
                );
                HookResponse::proceed()
            }
        }
    }

    fn handle(&self, kind: HookKind, cfg: &GroupConfig, event: &HookEvent) -> Result<HookResponse> {
        let aggregator = cfg.role.is_aggregator();
        match (kind, aggregator) {
            (HookKind::SessionStart, _) => self.on_session_start(cfg),
            (HookKind::SubagentStart, true) => self.on_subagent_start(cfg, event),
            (HookKind::SubagentStop, true) => self.on_subagent_stop(cfg, event),
            (HookKind::PreToolUse, true) => self.on_pre_tool_use(cfg, event),
            (HookKind::Stop, true) => self.on_aggregator_stop(cfg),
            (HookKind::Stop, false) => self.on_worker_stop(cfg, event),
            _ => Ok(HookResponse::proceed()),
        }
    }

    fn open_store(&self) -> Result<CoordStore> {
        CoordStore::open(&self.store_path, self.settings.store.busy_timeout())
    }

    fn pattern(&self, cfg: &GroupConfig) -> Box<dyn Pattern> {
        pattern_for(cfg.kind, &self.settings)
    }

    fn barrier_timeout(&self, cfg: &GroupConfig) -> Option<Duration> {
        cfg.barrier_timeout
            .or_else(|| self.settings.barrier.timeout_secs.map(Duration::from_secs))
    }

    /// The subagent named by the event, if it is a usable unit id.
    fn subagent_spec(cfg: &GroupConfig, event: &HookEvent) -> Option<UnitSpec> {
        match event.agent_id.as_deref() {
            Some(id) if is_valid_ident(id) => Some(UnitSpec::subagent(cfg, id)),
            Some(id) => {
                tracing::debug!(group = %cfg.group_id, agent = %id, "subagent id fails identifier grammar; skipping");
                None
            }
            None => None,
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn on_session_start(&self, cfg: &GroupConfig) -> Result<HookResponse> {
        let Some(spec) = UnitSpec::own(cfg) else {
            return Ok(HookResponse::proceed());
        };
        let mut store = self.open_store()?;
        store.register_unit(&spec, cfg.total_units)?;
        Ok(HookResponse::proceed())
    }

    fn on_subagent_start(&self, cfg: &GroupConfig, event: &HookEvent) -> Result<HookResponse> {
        let Some(spec) = Self::subagent_spec(cfg, event) else {
            return Ok(HookResponse::proceed());
        };
        let mut store = self.open_store()?;
        store.register_unit(&spec, cfg.total_units)?;
        Ok(HookResponse::proceed())
    }

    fn on_subagent_stop(&self, cfg: &GroupConfig, event: &HookEvent) -> Result<HookResponse> {
        let Some(spec) = Self::subagent_spec(cfg, event) else {
            return Ok(HookResponse::proceed());
        };
        let mut store = self.open_store()?;
        let done = store.complete_unit(&spec, event.output.as_deref(), cfg.total_units)?;
        self.completed_response(cfg, &store, &spec, done)
    }

    fn on_worker_stop(&self, cfg: &GroupConfig, event: &HookEvent) -> Result<HookResponse> {
        let Some(spec) = UnitSpec::own(cfg) else {
            return Ok(HookResponse::proceed());
        };
        let mut store = self.open_store()?;
        let done = store.complete_unit(&spec, event.output.as_deref(), cfg.total_units)?;
        self.completed_response(cfg, &store, &spec, done)
    }

    fn completed_response(
        &self,
        cfg: &GroupConfig,
        store: &CoordStore,
        spec: &UnitSpec,
        done: Completion,
    ) -> Result<HookResponse> {
        let pattern = self.pattern(cfg);
        let progress = done.progress;
        // Side effects such as auto-advance belong to the first delivery only.
        let extra = if done.newly_completed {
            let ctx = AdvanceContext {
                root: &self.root,
                cfg,
                store,
                spawner: self.spawner,
            };
            pattern.after_complete(&ctx, spec, progress)?
        } else {
            tracing::debug!(group = %cfg.group_id, unit = %spec.unit_id, "repeat completion; skipping follow-up");
            None
        };
        let mut message = format!("Recorded {} as complete. ", spec_label(spec));
        message.push_str(&progress_line(pattern.as_ref(), progress));
        if let Some(extra) = extra {
            message.push(' ');
            message.push_str(&extra);
        }
        Ok(HookResponse::proceed_with(message))
    }

    fn on_pre_tool_use(&self, cfg: &GroupConfig, event: &HookEvent) -> Result<HookResponse> {
        let launches_subagent = event
            .tool_name
            .as_deref()
            .is_some_and(|t| SUBAGENT_TOOLS.contains(&t));
        if !launches_subagent {
            return Ok(HookResponse::proceed());
        }
        let store = self.open_store()?;
        let pattern = self.pattern(cfg);
        let progress = store.progress(&cfg.group_id, pattern.worker_role(), cfg.total_units)?;
        Ok(HookResponse::proceed_with(format!(
            "Group {}: {}",
            cfg.group_id,
            progress_line(pattern.as_ref(), progress)
        )))
    }

    fn on_aggregator_stop(&self, cfg: &GroupConfig) -> Result<HookResponse> {
        let store = self.open_store()?;
        let pattern = self.pattern(cfg);
        let role = pattern.worker_role();
        let progress = store.progress(&cfg.group_id, role, cfg.total_units)?;
        let units = store.completed_units(&cfg.group_id, role)?;
        let timeout = self.barrier_timeout(cfg);
        let started_at = match timeout {
            Some(_) => store.group_started_at(&cfg.group_id)?,
            None => None,
        };

        let decision = barrier::evaluate(progress, units, started_at, timeout, Utc::now());
        tracing::info!(
            group = %cfg.group_id,
            completed = progress.completed,
            total = progress.total,
            released = decision.is_released(),
            "barrier evaluated"
        );
        Ok(decision.into_response(pattern.as_ref()))
    }
}

fn spec_label(spec: &UnitSpec) -> String {
    match spec.index {
        Some(i) => format!("{} {i}", spec.role),
        None => format!("{} {}", spec.role, spec.unit_id),
    }
}
