use crate::output::print_json_line;
use clap::ValueEnum;
use muster_core::config::{GroupConfig, Settings};
use muster_core::engine::Engine;
use muster_core::hook::{HookEvent, HookKind, HookResponse};
use muster_core::spawn::ClaudeSpawner;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookFormat {
    /// `{"result": "continue"|"block", "message": ...}`
    Native,
    /// `{"decision": "block", "reason": ...}` as Claude Code hooks expect
    Claude,
}

/// Read one event from stdin, dispatch it, print one response.
///
/// Always succeeds: every failure inside resolves to `continue`.
pub fn run(root: &Path, db: &Path, event: Option<&str>, format: HookFormat) -> anyhow::Result<()> {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        tracing::warn!(error = %e, "failed to read hook payload from stdin");
    }
    let payload = HookEvent::parse(&input);

    let kind = match event {
        Some(name) => name.parse::<HookKind>().ok(),
        None => payload.kind(),
    };

    let response = match kind {
        Some(kind) => dispatch(root, db, kind, &payload),
        None => {
            tracing::warn!(
                event = event.unwrap_or_default(),
                payload_event = payload.hook_event_name.as_deref().unwrap_or_default(),
                "unknown hook event; continuing"
            );
            HookResponse::proceed()
        }
    };

    match format {
        HookFormat::Native => print_json_line(&response),
        HookFormat::Claude => print_json_line(&response.to_claude_json()),
    }
}

fn dispatch(root: &Path, db: &Path, kind: HookKind, payload: &HookEvent) -> HookResponse {
    let cfg = GroupConfig::from_env();
    if cfg.is_none() {
        return HookResponse::proceed();
    }
    let settings = Settings::load(root).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid .muster/config.yaml; using defaults");
        Settings::default()
    });
    let spawner = ClaudeSpawner::from_settings(&settings.spawn, root);
    let engine = Engine::new(root, db, settings, &spawner);
    engine.dispatch(kind, cfg.as_ref(), payload)
}
