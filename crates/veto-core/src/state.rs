use crate::wire::InboundEvent;
use crate::{
    AgentPhase, ApprovalQueue, ApprovalStatus, Decision, DecisionLog, LifecyclePhase,
    PendingApproval, Stats, StatusSnapshot,
};
use chrono::{DateTime, Duration, Utc};

pub const CHANNEL_FAILURE_MESSAGE: &str = "realtime channel connection failed";

/// Everything the reducer can fold into [`SessionState`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionCreated { session_id: String },
    CreateFailed { message: String },
    ChannelOpened,
    ChannelClosed,
    ChannelFailed,
    Inbound(InboundEvent),
    DecodeRejected { reason: String },
    CommandFailed { command: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub connected: bool,
    pub phase: LifecyclePhase,
    pub status: Option<StatusSnapshot>,
    pub decisions: DecisionLog,
    pub approvals: ApprovalQueue,
    pub stats: Stats,
    /// Last error, kept until the next start or reset.
    pub error: Option<String>,
    /// Last non-fatal signal (dropped frame, failed command).
    pub warning: Option<String>,
    pub outcome: Option<bool>,
    pub started_at: Option<DateTime<Utc>>,
    decision_seq: u64,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.decisions.latest()
    }

    pub fn has_pending_approval(&self) -> bool {
        self.approvals.has_unresolved()
    }

    pub fn first_unresolved_approval(&self) -> Option<&PendingApproval> {
        self.approvals.first_unresolved()
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.started_at
            .map(|started| (now - started).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }
}

/// Folds one event into the state. Events must be applied in arrival order.
pub fn reduce(mut state: SessionState, event: SessionEvent, received_at: DateTime<Utc>) -> SessionState {
    match event {
        SessionEvent::SessionCreated { session_id } => {
            state.session_id = Some(session_id);
            state.phase = LifecyclePhase::Connecting;
            state.started_at = Some(received_at);
        }
        SessionEvent::CreateFailed { message } => {
            state.error = Some(message);
        }
        SessionEvent::ChannelOpened => {
            state.connected = true;
        }
        SessionEvent::ChannelClosed => {
            state.connected = false;
        }
        SessionEvent::ChannelFailed => {
            state.connected = false;
            state.error = Some(CHANNEL_FAILURE_MESSAGE.to_string());
        }
        SessionEvent::Inbound(event) => apply_inbound(&mut state, event, received_at),
        SessionEvent::DecodeRejected { reason } => {
            state.warning = Some(format!("dropped malformed event: {reason}"));
        }
        SessionEvent::CommandFailed { command, message } => {
            state.warning = Some(format!("{command} request failed: {message}"));
        }
    }
    state
}

fn apply_inbound(state: &mut SessionState, event: InboundEvent, received_at: DateTime<Utc>) {
    match event {
        InboundEvent::Decision(payload) => {
            state.decision_seq += 1;
            let decision = Decision {
                id: format!("decision-{}", state.decision_seq),
                sequence: state.decision_seq,
                action: payload.action,
                args: payload.args,
                verdict: payload.decision,
                reason: payload.reason,
                latency_ms: payload.latency_ms,
                mode: payload.mode,
                received_at,
            };
            state.stats = state.stats.with_decision(&decision);
            state.decisions.push(decision);
        }
        InboundEvent::ApprovalNeeded(payload) => {
            state.approvals.push(PendingApproval {
                id: payload.id,
                action: payload.action,
                args: payload.args,
                reason: payload.reason,
                received_at,
                status: ApprovalStatus::Unresolved,
            });
        }
        InboundEvent::ApprovalResolved(payload) => {
            state.approvals.resolve(&payload.id, payload.decision);
        }
        InboundEvent::Status(payload) => {
            let snapshot = StatusSnapshot {
                step: payload.step,
                max_steps: payload.max_steps,
                state: payload.state,
            };
            state.phase = phase_for(snapshot.state, state);
            state.status = Some(snapshot);
        }
        InboundEvent::Done(payload) => {
            state.outcome = Some(payload.success);
            state.phase = LifecyclePhase::Done {
                success: payload.success,
            };
            if let Some(status) = state.status.as_mut() {
                status.state = AgentPhase::Done;
            }
        }
        InboundEvent::Error(payload) => {
            // Without a status snapshot this is a connection-level error; phase stays put.
            if let Some(status) = state.status.as_mut() {
                status.state = AgentPhase::Error;
                state.phase = LifecyclePhase::Error {
                    message: payload.message.clone(),
                };
            }
            state.error = Some(payload.message);
        }
        InboundEvent::Unrecognized { .. } => {}
    }
}

fn phase_for(agent_phase: AgentPhase, state: &SessionState) -> LifecyclePhase {
    match agent_phase {
        AgentPhase::CreatingPolicies => LifecyclePhase::CreatingPolicies,
        AgentPhase::Initializing => LifecyclePhase::Initializing,
        AgentPhase::Running => LifecyclePhase::Running,
        AgentPhase::Paused => LifecyclePhase::Paused,
        AgentPhase::Stopped => LifecyclePhase::Stopped,
        AgentPhase::Done => LifecyclePhase::Done {
            success: state.outcome.unwrap_or(false),
        },
        AgentPhase::Error => LifecyclePhase::Error {
            message: state.error.clone().unwrap_or_default(),
        },
    }
}
