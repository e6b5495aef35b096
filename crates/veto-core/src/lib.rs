pub mod approvals;
pub mod decisions;
pub mod state;
pub mod stats;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use approvals::ApprovalQueue;
pub use decisions::DecisionLog;
pub use state::{reduce, SessionEvent, SessionState};
pub use stats::{LatencyBand, LatencyWindow, Stats, LATENCY_WINDOW};
pub use wire::{decode_event, DecodeError, InboundEvent};

/// Argument mapping attached to an agent action.
pub type ActionArgs = Map<String, Value>;

/// Coarse stage of a session as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Connecting,
    CreatingPolicies,
    Initializing,
    Running,
    Paused,
    Stopped,
    Done {
        success: bool,
    },
    Error {
        message: String,
    },
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Connecting => "connecting",
            LifecyclePhase::CreatingPolicies => "creating_policies",
            LifecyclePhase::Initializing => "initializing",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Paused => "paused",
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Done { .. } => "done",
            LifecyclePhase::Error { .. } => "error",
        }
    }

    /// Operator-facing label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "IDLE",
            LifecyclePhase::Connecting => "CONNECTING",
            LifecyclePhase::CreatingPolicies => "CREATING POLICIES",
            LifecyclePhase::Initializing => "INITIALIZING",
            LifecyclePhase::Running => "RUNNING",
            LifecyclePhase::Paused => "AWAITING APPROVAL",
            LifecyclePhase::Stopped => "STOPPED",
            LifecyclePhase::Done { .. } => "COMPLETE",
            LifecyclePhase::Error { .. } => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::Stopped | LifecyclePhase::Done { .. } | LifecyclePhase::Error { .. }
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of `status.state` on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    CreatingPolicies,
    Initializing,
    Running,
    Paused,
    Stopped,
    Done,
    Error,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::CreatingPolicies => "creating_policies",
            AgentPhase::Initializing => "initializing",
            AgentPhase::Running => "running",
            AgentPhase::Paused => "paused",
            AgentPhase::Stopped => "stopped",
            AgentPhase::Done => "done",
            AgentPhase::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub step: u32,
    pub max_steps: u32,
    pub state: AgentPhase,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
        }
    }
}

/// Human answer to a pending approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Approve,
    Deny,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Approve => "approve",
            Resolution::Deny => "deny",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalStatus {
    #[default]
    Unresolved,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ApprovalStatus::Unresolved)
    }
}

impl From<Resolution> for ApprovalStatus {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::Approve => ApprovalStatus::Approved,
            Resolution::Deny => ApprovalStatus::Denied,
        }
    }
}

/// One allow/deny verdict from the validation service. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub id: String,
    pub sequence: u64,
    pub action: String,
    pub args: ActionArgs,
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub latency_ms: u64,
    pub mode: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub id: String,
    pub action: String,
    pub args: ActionArgs,
    pub reason: String,
    pub received_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LlmModel {
    #[default]
    #[serde(rename = "claude-sonnet-4.5")]
    ClaudeSonnet45,
    #[serde(rename = "claude-opus-4.5")]
    ClaudeOpus45,
}

impl LlmModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmModel::ClaudeSonnet45 => "claude-sonnet-4.5",
            LlmModel::ClaudeOpus45 => "claude-opus-4.5",
        }
    }
}

impl fmt::Display for LlmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmModel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "claude-sonnet-4.5" | "sonnet" => Ok(LlmModel::ClaudeSonnet45),
            "claude-opus-4.5" | "opus" => Ok(LlmModel::ClaudeOpus45),
            other => Err(format!("Unknown model: {other}")),
        }
    }
}

/// Inputs for starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub veto_api_key: String,
    pub veto_base_url: String,
    pub llm_model: LlmModel,
    pub task: String,
    pub use_demo_policies: bool,
    pub model_provider_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_parses_aliases_and_canonical_names() {
        assert_eq!(
            "claude-opus-4.5".parse::<LlmModel>(),
            Ok(LlmModel::ClaudeOpus45)
        );
        assert_eq!(" Sonnet ".parse::<LlmModel>(), Ok(LlmModel::ClaudeSonnet45));
        assert!("gpt-4".parse::<LlmModel>().is_err());
        assert_eq!(
            serde_json::to_value(LlmModel::ClaudeOpus45).expect("serialize"),
            serde_json::json!("claude-opus-4.5")
        );
    }

    #[test]
    fn phase_labels_match_operator_vocabulary() {
        assert_eq!(LifecyclePhase::Paused.label(), "AWAITING APPROVAL");
        assert_eq!(LifecyclePhase::Done { success: true }.label(), "COMPLETE");
        assert!(LifecyclePhase::Stopped.is_terminal());
        assert!(!LifecyclePhase::Running.is_terminal());
        assert_eq!(
            LifecyclePhase::Error {
                message: "boom".to_string()
            }
            .as_str(),
            "error"
        );
    }
}
