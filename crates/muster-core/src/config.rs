use crate::error::Result;
use crate::paths;
use crate::types::{PatternKind, Role};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// BarrierSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierSettings {
    /// Supervision timeout. `None` keeps an incomplete barrier closed forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Per-unit output preview length in map-reduce synthesis prompts.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_preview_chars() -> usize {
    500
}

impl Default for BarrierSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            preview_chars: default_preview_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Cap on upstream output carried into the next stage's prompt.
    #[serde(default = "default_carry_forward_chars")]
    pub carry_forward_chars: usize,
}

fn default_carry_forward_chars() -> usize {
    8000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            carry_forward_chars: default_carry_forward_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpawnSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSettings {
    #[serde(default = "default_spawn_binary")]
    pub binary: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_spawn_binary() -> String {
    "claude".to_string()
}

fn default_max_turns() -> u32 {
    100
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            binary: default_spawn_binary(),
            model: None,
            max_turns: default_max_turns(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Project-level tuning loaded from `.muster/config.yaml`. Every field has a
/// default, so a missing file is equivalent to an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub barrier: BarrierSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub spawn: SpawnSettings,
}

impl Settings {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::settings_path(root);
        match crate::io::read_optional(&path)? {
            Some(data) if !data.trim().is_empty() => Ok(serde_yaml::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::settings_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.store.busy_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "store.busy_timeout_ms is 0: concurrent writers will fail immediately"
                    .to_string(),
            });
        } else if self.store.busy_timeout_ms > 60_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "store.busy_timeout_ms is {}: hooks may stall for over a minute",
                    self.store.busy_timeout_ms
                ),
            });
        }

        if self.barrier.timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "barrier.timeout_secs is 0: every barrier releases immediately"
                    .to_string(),
            });
        }

        if self.pipeline.carry_forward_chars == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "pipeline.carry_forward_chars is 0: stages receive no upstream output"
                    .to_string(),
            });
        }

        if self.spawn.binary.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "spawn.binary is empty: pipeline auto-advance is disabled".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// GroupConfig
// ---------------------------------------------------------------------------

/// Environment variable names read by [`GroupConfig::from_lookup`].
pub mod env {
    pub const GROUP_ID: &str = "MUSTER_GROUP_ID";
    pub const PATTERN: &str = "MUSTER_PATTERN";
    pub const ROLE: &str = "MUSTER_ROLE";
    pub const UNIT_INDEX: &str = "MUSTER_UNIT_INDEX";
    pub const TOTAL_UNITS: &str = "MUSTER_TOTAL_UNITS";
    pub const MANIFEST: &str = "MUSTER_MANIFEST";
    pub const BARRIER_TIMEOUT_SECS: &str = "MUSTER_BARRIER_TIMEOUT_SECS";
    pub const AGENT_ID: &str = "AGENT_ID";
    pub const PARENT_AGENT_ID: &str = "PARENT_AGENT_ID";
    pub const LEGACY_PATTERN: &str = "PATTERN_TYPE";
    pub const LEGACY_ROLE: &str = "AGENT_ROLE";
}

/// Trusted, per-invocation description of where the caller sits in a group.
///
/// Built once at the process boundary; core functions take it by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub group_id: String,
    pub kind: PatternKind,
    pub role: Role,
    pub index: Option<u32>,
    pub total_units: Option<u32>,
    pub agent_id: Option<String>,
    pub parent_id: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub barrier_timeout: Option<Duration>,
}

impl GroupConfig {
    pub fn new(group_id: impl Into<String>, kind: PatternKind, role: Role) -> Self {
        Self {
            group_id: group_id.into(),
            kind,
            role,
            index: None,
            total_units: None,
            agent_id: None,
            parent_id: None,
            manifest_path: None,
            barrier_timeout: None,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total_units = Some(total);
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Read the process environment. See [`GroupConfig::from_lookup`].
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from a key lookup.
    ///
    /// Returns `None` when no group id is present, when it fails the
    /// identifier grammar, or when pattern/role are missing or unknown: the
    /// invocation is then simply not part of any group. Unparseable numeric
    /// fields are dropped rather than rejected.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let group_id = get(env::GROUP_ID)?;
        if !paths::is_valid_ident(&group_id) {
            tracing::debug!(group = %group_id, "group id fails identifier grammar; ignoring");
            return None;
        }

        let kind: PatternKind = get(env::PATTERN)
            .or_else(|| get(env::LEGACY_PATTERN))?
            .parse()
            .ok()?;
        let role: Role = match get(env::ROLE).or_else(|| get(env::LEGACY_ROLE)) {
            Some(r) => r.parse().ok()?,
            None => kind.worker_role(),
        };

        Some(Self {
            group_id,
            kind,
            role,
            index: get(env::UNIT_INDEX).and_then(|v| v.parse().ok()),
            total_units: get(env::TOTAL_UNITS).and_then(|v| v.parse().ok()),
            agent_id: get(env::AGENT_ID),
            parent_id: get(env::PARENT_AGENT_ID),
            manifest_path: get(env::MANIFEST).map(PathBuf::from),
            barrier_timeout: get(env::BARRIER_TIMEOUT_SECS)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        })
    }

    /// True if every identifier this config would write is well-formed.
    pub fn is_valid(&self) -> bool {
        paths::is_valid_ident(&self.group_id)
            && self.agent_id.as_deref().map_or(true, paths::is_valid_ident)
            && self.parent_id.as_deref().map_or(true, paths::is_valid_ident)
    }

    /// The caller's own unit id: its index when known, otherwise its agent id.
    pub fn own_unit_id(&self) -> Option<String> {
        self.index
            .map(|i| i.to_string())
            .or_else(|| self.agent_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
