use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use veto_core::{
    ApprovalStatus, Decision, InboundEvent, LatencyBand, LatencyWindow, PendingApproval,
    SessionEvent, SessionState, Stats,
};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Approve(Option<String>),
    Deny(Option<String>),
    Stop,
    Reset,
    Restart,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("{command} takes no arguments")]
    UnexpectedArgument { command: String },
}

pub const HELP: &str = "commands: approve|a [id], deny|d [id], stop, reset, restart, status, help, quit|q";

pub fn parse_command(line: &str) -> Result<OperatorCommand, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(CommandError::Empty);
    };
    let head = head.to_lowercase();
    let argument = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err(CommandError::UnexpectedArgument { command: head });
    }
    let bare = |command: OperatorCommand| match &argument {
        Some(_) => Err(CommandError::UnexpectedArgument {
            command: head.clone(),
        }),
        None => Ok(command),
    };
    match head.as_str() {
        "approve" | "a" => Ok(OperatorCommand::Approve(argument)),
        "deny" | "d" => Ok(OperatorCommand::Deny(argument)),
        "stop" => bare(OperatorCommand::Stop),
        "reset" => bare(OperatorCommand::Reset),
        "restart" => bare(OperatorCommand::Restart),
        "status" | "s" => bare(OperatorCommand::Status),
        "help" | "h" | "?" => bare(OperatorCommand::Help),
        "quit" | "q" | "exit" => bare(OperatorCommand::Quit),
        _ => Err(CommandError::Unknown(head)),
    }
}

/// Explicit id, else the first unresolved approval in display order (newest first).
pub fn approval_target(state: &SessionState, id: Option<String>) -> Option<String> {
    id.or_else(|| {
        state
            .first_unresolved_approval()
            .map(|approval| approval.id.clone())
    })
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.num_seconds().max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn status_line(state: &SessionState, now: DateTime<Utc>) -> String {
    let dot = if state.connected { '●' } else { '○' };
    let mut line = format!("{dot} {}", state.phase.label());
    if let Some(status) = state.status.filter(|status| status.step > 0) {
        line.push_str(&format!("  Step {}/{}", status.step, status.max_steps));
    }
    line.push_str(&format!("  {}", format_elapsed(state.elapsed(now))));
    let pending = state.approvals.unresolved_count();
    if pending > 0 {
        line.push_str(&format!("  {pending} pending"));
    }
    if let Some(session_id) = &state.session_id {
        line.push_str(&format!("  [{session_id}]"));
    }
    line
}

pub fn sparkline(window: &LatencyWindow) -> String {
    let peak = u128::from(window.iter().max().unwrap_or(0));
    let top = SPARK_LEVELS.len() - 1;
    window
        .iter()
        .map(|sample| {
            if peak == 0 {
                return SPARK_LEVELS[0];
            }
            let level = (u128::from(sample) * top as u128 + peak / 2) / peak;
            SPARK_LEVELS[usize::try_from(level).unwrap_or(top).min(top)]
        })
        .collect()
}

pub fn stats_line(stats: &Stats) -> String {
    let mut parts = vec![
        format!("Validated {}", stats.total()),
        format!("allowed {}", stats.allowed),
        format!("denied {}", stats.denied),
    ];
    if !stats.latencies.is_empty() {
        parts.push(sparkline(&stats.latencies));
    }
    parts.push(match stats.latency_band() {
        Some(band) => format!("avg {}ms ({})", stats.avg_latency, band_label(band)),
        None => format!("avg {}ms", stats.avg_latency),
    });
    if let Some(min) = stats.min_latency {
        parts.push(format!("min {min}ms"));
    }
    parts.push(format!("max {}ms", stats.max_latency));
    parts.join(" | ")
}

fn band_label(band: LatencyBand) -> &'static str {
    match band {
        LatencyBand::Fast => "fast",
        LatencyBand::Moderate => "moderate",
        LatencyBand::Slow => "slow",
    }
}

pub fn decision_line(decision: &Decision) -> String {
    let mut line = format!(
        "#{} {:<5} {} {}ms",
        decision.sequence,
        decision.verdict.as_str().to_uppercase(),
        decision.action,
        decision.latency_ms
    );
    if let Some(reason) = decision.reason.as_deref().filter(|r| !r.is_empty()) {
        line.push_str(&format!(" ({reason})"));
    }
    line
}

pub fn approval_line(approval: &PendingApproval) -> String {
    let status = match approval.status {
        ApprovalStatus::Unresolved => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Denied => "denied",
    };
    let mut line = format!("approval {} [{status}] {}", approval.id, approval.action);
    if !approval.reason.is_empty() {
        line.push_str(&format!(": {}", approval.reason));
    }
    line
}

/// Line to print after `event` was folded into `state`, if the event is worth one.
pub fn event_line(event: &SessionEvent, state: &SessionState, now: DateTime<Utc>) -> Option<String> {
    match event {
        SessionEvent::SessionCreated { session_id } => Some(format!("session {session_id} created")),
        SessionEvent::CreateFailed { message } => Some(format!("error: {message}")),
        SessionEvent::ChannelOpened => Some("channel connected".to_string()),
        SessionEvent::ChannelClosed => Some("channel closed".to_string()),
        SessionEvent::ChannelFailed => state.error.as_ref().map(|error| format!("error: {error}")),
        SessionEvent::DecodeRejected { .. } | SessionEvent::CommandFailed { .. } => state
            .warning
            .as_ref()
            .map(|warning| format!("warning: {warning}")),
        SessionEvent::Inbound(inbound) => match inbound {
            InboundEvent::Decision(_) => state.decisions.latest().map(decision_line),
            InboundEvent::ApprovalNeeded(payload) => {
                state.approvals.get(&payload.id).map(approval_line)
            }
            InboundEvent::ApprovalResolved(payload) => {
                state.approvals.get(&payload.id).map(approval_line)
            }
            InboundEvent::Status(_) => Some(status_line(state, now)),
            InboundEvent::Done(payload) => Some(format!(
                "session complete ({})",
                if payload.success { "success" } else { "failed" }
            )),
            InboundEvent::Error(payload) => Some(format!("error: {}", payload.message)),
            InboundEvent::Unrecognized { .. } => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Map;
    use veto_core::wire::{ApprovalNeededPayload, DecisionPayload, StatusPayload};
    use veto_core::{reduce, AgentPhase, Verdict};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).single().expect("timestamp")
    }

    fn fold(events: Vec<SessionEvent>) -> SessionState {
        events
            .into_iter()
            .fold(SessionState::default(), |state, event| reduce(state, event, at(0)))
    }

    fn decision_event(action: &str, verdict: Verdict, latency_ms: u64) -> SessionEvent {
        SessionEvent::Inbound(InboundEvent::Decision(DecisionPayload {
            action: action.to_string(),
            args: Map::new(),
            decision: verdict,
            reason: None,
            latency_ms,
            mode: "cloud".to_string(),
        }))
    }

    fn approval_event(id: &str) -> SessionEvent {
        SessionEvent::Inbound(InboundEvent::ApprovalNeeded(ApprovalNeededPayload {
            id: id.to_string(),
            action: "submit_form".to_string(),
            args: Map::new(),
            reason: "needs a human".to_string(),
        }))
    }

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(parse_command("approve ap-1"), Ok(OperatorCommand::Approve(Some("ap-1".into()))));
        assert_eq!(parse_command("a"), Ok(OperatorCommand::Approve(None)));
        assert_eq!(parse_command("  D ap-2 "), Ok(OperatorCommand::Deny(Some("ap-2".into()))));
        assert_eq!(parse_command("stop"), Ok(OperatorCommand::Stop));
        assert_eq!(parse_command("restart"), Ok(OperatorCommand::Restart));
        assert_eq!(parse_command("q"), Ok(OperatorCommand::Quit));
        assert_eq!(parse_command(""), Err(CommandError::Empty));
        assert_eq!(
            parse_command("launch"),
            Err(CommandError::Unknown("launch".into()))
        );
        assert_eq!(
            parse_command("stop now"),
            Err(CommandError::UnexpectedArgument {
                command: "stop".into()
            })
        );
        assert!(parse_command("approve ap-1 ap-2").is_err());
    }

    #[test]
    fn idless_approval_targets_first_unresolved() {
        let mut state = fold(vec![approval_event("ap-1"), approval_event("ap-2")]);
        assert_eq!(approval_target(&state, None).as_deref(), Some("ap-2"));
        assert_eq!(
            approval_target(&state, Some("ap-1".into())).as_deref(),
            Some("ap-1")
        );

        state.approvals.resolve("ap-2", veto_core::Resolution::Approve);
        assert_eq!(approval_target(&state, None).as_deref(), Some("ap-1"));
        state.approvals.resolve("ap-1", veto_core::Resolution::Deny);
        assert_eq!(approval_target(&state, None), None);
    }

    #[test]
    fn elapsed_formats_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::seconds(0)), "0:00");
        assert_eq!(format_elapsed(Duration::seconds(65)), "1:05");
        assert_eq!(format_elapsed(Duration::seconds(3_601)), "60:01");
        assert_eq!(format_elapsed(Duration::seconds(-4)), "0:00");
    }

    #[test]
    fn status_line_shows_step_only_once_started() {
        let idle = SessionState::default();
        assert_eq!(status_line(&idle, at(10)), "○ IDLE  0:00");

        let state = fold(vec![
            SessionEvent::SessionCreated {
                session_id: "s-1".into(),
            },
            SessionEvent::ChannelOpened,
            SessionEvent::Inbound(InboundEvent::Status(StatusPayload {
                step: 3,
                max_steps: 100,
                state: AgentPhase::Running,
            })),
        ]);
        assert_eq!(status_line(&state, at(75)), "● RUNNING  Step 3/100  1:15  [s-1]");
    }

    #[test]
    fn stats_line_omits_unset_minimum() {
        assert_eq!(
            stats_line(&Stats::default()),
            "Validated 0 | allowed 0 | denied 0 | avg 0ms | max 0ms"
        );
        let state = fold(vec![
            decision_event("navigate", Verdict::Allow, 10),
            decision_event("submit_form", Verdict::Deny, 30),
        ]);
        assert_eq!(
            stats_line(&state.stats),
            "Validated 2 | allowed 1 | denied 1 | ▃█ | avg 20ms (fast) | min 10ms | max 30ms"
        );
    }

    #[test]
    fn sparkline_scales_to_window_peak() {
        let state = fold(vec![
            decision_event("a", Verdict::Allow, 0),
            decision_event("b", Verdict::Allow, 50),
            decision_event("c", Verdict::Allow, 100),
        ]);
        assert_eq!(sparkline(&state.stats.latencies), "▁▅█");

        let flat = fold(vec![
            decision_event("a", Verdict::Allow, 0),
            decision_event("b", Verdict::Allow, 0),
        ]);
        assert_eq!(sparkline(&flat.stats.latencies), "▁▁");
    }

    #[test]
    fn sparkline_handles_extreme_latencies() {
        let state = fold(vec![
            decision_event("a", Verdict::Allow, 1),
            decision_event("b", Verdict::Allow, u64::MAX),
        ]);
        assert_eq!(sparkline(&state.stats.latencies), "▁█");
    }

    #[test]
    fn stats_line_labels_latency_band() {
        let state = fold(vec![decision_event("navigate", Verdict::Deny, 250)]);
        assert_eq!(
            stats_line(&state.stats),
            "Validated 1 | allowed 0 | denied 1 | █ | avg 250ms (slow) | min 250ms | max 250ms"
        );
        let state = fold(vec![decision_event("navigate", Verdict::Allow, 120)]);
        assert!(stats_line(&state.stats).contains("avg 120ms (moderate)"));
    }

    #[test]
    fn status_line_counts_pending_approvals() {
        let mut state = fold(vec![approval_event("ap-1"), approval_event("ap-2")]);
        assert_eq!(status_line(&state, at(0)), "○ IDLE  0:00  2 pending");
        state.approvals.resolve("ap-1", veto_core::Resolution::Approve);
        assert_eq!(status_line(&state, at(0)), "○ IDLE  0:00  1 pending");
        state.approvals.resolve("ap-2", veto_core::Resolution::Deny);
        assert_eq!(status_line(&state, at(0)), "○ IDLE  0:00");
    }

    #[test]
    fn event_lines_describe_folded_state() {
        let state = fold(vec![decision_event("navigate", Verdict::Deny, 42)]);
        let event = decision_event("navigate", Verdict::Deny, 42);
        assert_eq!(
            event_line(&event, &state, at(0)).as_deref(),
            Some("#1 DENY  navigate 42ms")
        );

        let state = fold(vec![approval_event("ap-7")]);
        assert_eq!(
            event_line(&approval_event("ap-7"), &state, at(0)).as_deref(),
            Some("approval ap-7 [pending] submit_form: needs a human")
        );

        let unknown = SessionEvent::Inbound(InboundEvent::Unrecognized {
            kind: "screenshot".into(),
        });
        assert_eq!(event_line(&unknown, &state, at(0)), None);
    }
}
