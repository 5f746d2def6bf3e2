//! Launching the next unit of work as a detached agent process.
//!
//! The launching hook never waits on the child. The spawned agent tracks its
//! own lifecycle by calling back into `muster hook` with the `MUSTER_*`
//! environment set here.
//!
//! # Command shape
//! ```text
//! claude -p <prompt> --session-id <uuid> --max-turns <n> --output-format json
//!        [--model <model>] [--agent <agent>]
//! ```
//! stdout goes to the stage output file; stdin and stderr are null.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use uuid::Uuid;

use crate::config::{env, SpawnSettings};
use crate::error::{MusterError, Result};
use crate::io::ensure_dir;
use crate::types::{PatternKind, Role};

/// Environment variable that marks a nested runtime session. Removed so the
/// child does not refuse to start inside the parent's session.
const NESTED_SESSION_VAR: &str = "CLAUDECODE";

/// Fully-formed request for the next pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub group_id: String,
    pub stage_index: u32,
    pub total_stages: u32,
    pub agent: Option<String>,
    pub prompt: String,
    pub manifest_path: PathBuf,
    pub output_file: PathBuf,
    pub parent_id: Option<String>,
}

/// Fire-and-forget launcher.
pub trait Spawner: Send + Sync {
    fn spawn(&self, req: &SpawnRequest) -> Result<()>;
}

/// Spawns the `claude` CLI (or whatever `spawn.binary` names).
#[derive(Debug, Clone)]
pub struct ClaudeSpawner {
    binary: String,
    model: Option<String>,
    max_turns: u32,
    root: PathBuf,
}

impl ClaudeSpawner {
    pub fn from_settings(settings: &SpawnSettings, root: &Path) -> Self {
        Self {
            binary: settings.binary.clone(),
            model: settings.model.clone(),
            max_turns: settings.max_turns,
            root: root.to_path_buf(),
        }
    }

    /// Resolve the binary on `PATH`.
    pub fn detect(&self) -> Result<PathBuf> {
        if self.binary.trim().is_empty() {
            return Err(MusterError::SpawnUnavailable(self.binary.clone()));
        }
        which::which(&self.binary).map_err(|_| MusterError::SpawnUnavailable(self.binary.clone()))
    }

    /// Build the command without stdio wiring or process-group setup.
    pub fn command(&self, program: &Path, req: &SpawnRequest, session_id: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-p")
            .arg(&req.prompt)
            .arg("--session-id")
            .arg(session_id)
            .arg("--max-turns")
            .arg(self.max_turns.to_string())
            .arg("--output-format")
            .arg("json");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(agent) = req.agent.as_deref().filter(|a| !a.is_empty()) {
            cmd.arg("--agent").arg(agent);
        }

        cmd.current_dir(&self.root)
            .env_remove(NESTED_SESSION_VAR)
            .env(env::GROUP_ID, &req.group_id)
            .env(env::PATTERN, PatternKind::Pipeline.as_str())
            .env(env::ROLE, Role::Stage.as_str())
            .env(env::UNIT_INDEX, req.stage_index.to_string())
            .env(env::TOTAL_UNITS, req.total_stages.to_string())
            .env(env::MANIFEST, &req.manifest_path)
            .env(env::AGENT_ID, Uuid::new_v4().to_string())
            .env("MUSTER_ROOT", &self.root);
        match &req.parent_id {
            Some(parent) => cmd.env(env::PARENT_AGENT_ID, parent),
            None => cmd.env_remove(env::PARENT_AGENT_ID),
        };
        cmd
    }
}

impl Spawner for ClaudeSpawner {
    fn spawn(&self, req: &SpawnRequest) -> Result<()> {
        let program = self.detect()?;

        if let Some(parent) = req.output_file.parent() {
            ensure_dir(parent)?;
        }
        let stdout = File::create(&req.output_file)?;

        let session_id = Uuid::new_v4().to_string();
        let mut cmd = self.command(&program, req, &session_id);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null());

        // Own process group so the child outlives the hook's session teardown.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd
            .spawn()
            .map_err(|e| MusterError::SpawnFailed(format!("{}: {e}", program.display())))?;

        tracing::info!(
            group = %req.group_id,
            stage = req.stage_index,
            total = req.total_stages,
            pid = child.id(),
            session = %session_id,
            "spawned next pipeline stage"
        );
        Ok(())
    }
}
