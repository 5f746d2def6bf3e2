use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::MusterError;

// ---------------------------------------------------------------------------
// HookKind
// ---------------------------------------------------------------------------

/// Lifecycle events an agent runtime reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    SessionStart,
    SubagentStart,
    SubagentStop,
    PreToolUse,
    Stop,
}

impl HookKind {
    pub fn all() -> &'static [HookKind] {
        &[
            HookKind::SessionStart,
            HookKind::SubagentStart,
            HookKind::SubagentStop,
            HookKind::PreToolUse,
            HookKind::Stop,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::SessionStart => "session-start",
            HookKind::SubagentStart => "subagent-start",
            HookKind::SubagentStop => "subagent-stop",
            HookKind::PreToolUse => "pre-tool-use",
            HookKind::Stop => "stop",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookKind {
    type Err = MusterError;

    /// Accepts `subagent-stop`, `subagent_stop`, `SubagentStop` and `onSubagentStop`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        let norm = norm.strip_prefix("on").unwrap_or(norm.as_str());
        match norm {
            "sessionstart" => Ok(HookKind::SessionStart),
            "subagentstart" => Ok(HookKind::SubagentStart),
            "subagentstop" => Ok(HookKind::SubagentStop),
            "pretooluse" => Ok(HookKind::PreToolUse),
            "stop" => Ok(HookKind::Stop),
            _ => Err(MusterError::InvalidHookKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// HookEvent
// ---------------------------------------------------------------------------

/// The JSON payload a runtime passes on stdin. Every field is optional and
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookEvent {
    pub hook_event_name: Option<String>,
    pub session_id: Option<String>,
    /// Set by the runtime when this Stop was itself triggered by a blocked Stop.
    #[serde(deserialize_with = "lenient_bool")]
    pub stop_hook_active: bool,
    pub agent_id: Option<String>,
    pub agent_type: Option<String>,
    pub tool_name: Option<String>,
    #[serde(alias = "last_assistant_message")]
    pub output: Option<String>,
}

/// Accepts `true`, `"true"`/`"yes"`/`"1"` and non-zero numbers as set.
/// Anything else, including a wrong type, reads as unset instead of failing
/// the whole payload.
fn lenient_bool<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(de)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

impl HookEvent {
    /// Parse a payload; empty or malformed input yields an empty event.
    pub fn parse(input: &str) -> Self {
        if input.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(input) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable hook payload; treating as empty");
                Self::default()
            }
        }
    }

    /// The event name embedded in the payload, if it names a known hook.
    pub fn kind(&self) -> Option<HookKind> {
        self.hook_event_name.as_deref()?.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// HookResponse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookResult {
    Continue,
    Block,
}

/// What the runtime should do next. A block always carries a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResponse {
    pub result: HookResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HookResponse {
    pub fn proceed() -> Self {
        Self {
            result: HookResult::Continue,
            message: None,
        }
    }

    pub fn proceed_with(message: impl Into<String>) -> Self {
        Self {
            result: HookResult::Continue,
            message: Some(message.into()),
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self {
            result: HookResult::Block,
            message: Some(message.into()),
        }
    }

    pub fn is_block(&self) -> bool {
        self.result == HookResult::Block
    }

    /// Render in the shape Claude Code hooks expect on stdout.
    pub fn to_claude_json(&self) -> serde_json::Value {
        match (self.result, &self.message) {
            (HookResult::Block, msg) => serde_json::json!({
                "decision": "block",
                "reason": msg.clone().unwrap_or_default(),
            }),
            (HookResult::Continue, Some(msg)) => serde_json::json!({ "systemMessage": msg }),
            (HookResult::Continue, None) => serde_json::json!({}),
        }
    }
}
