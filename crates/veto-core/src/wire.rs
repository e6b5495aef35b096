use crate::{ActionArgs, AgentPhase, LlmModel, Resolution, SessionConfig, Verdict};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Decision(DecisionPayload),
    ApprovalNeeded(ApprovalNeededPayload),
    ApprovalResolved(ApprovalResolvedPayload),
    Status(StatusPayload),
    Done(DonePayload),
    Error(ErrorPayload),
    Unrecognized { kind: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Decision(_) => "decision",
            InboundEvent::ApprovalNeeded(_) => "approval_needed",
            InboundEvent::ApprovalResolved(_) => "approval_resolved",
            InboundEvent::Status(_) => "status",
            InboundEvent::Done(_) => "done",
            InboundEvent::Error(_) => "error",
            InboundEvent::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    pub action: String,
    #[serde(default)]
    pub args: ActionArgs,
    pub decision: Verdict,
    #[serde(default)]
    pub reason: Option<String>,
    pub latency_ms: u64,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalNeededPayload {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub args: ActionArgs,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalResolvedPayload {
    pub id: String,
    pub decision: Resolution,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub step: u32,
    pub max_steps: u32,
    pub state: AgentPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DonePayload {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("envelope decode failed: {0}")]
    Envelope(String),
    #[error("{kind} payload decode failed: {reason}")]
    Payload { kind: String, reason: String },
}

/// Decodes one realtime-channel message. Unknown `type` values are not errors.
pub fn decode_event(text: &str) -> Result<InboundEvent, DecodeError> {
    let envelope: RawEnvelope =
        serde_json::from_str(text).map_err(|err| DecodeError::Envelope(err.to_string()))?;
    let RawEnvelope { kind, data } = envelope;
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    let event = match kind.as_str() {
        "decision" => InboundEvent::Decision(payload(&kind, data)?),
        "approval_needed" => InboundEvent::ApprovalNeeded(payload(&kind, data)?),
        "approval_resolved" => InboundEvent::ApprovalResolved(payload(&kind, data)?),
        "status" => InboundEvent::Status(payload(&kind, data)?),
        "done" => InboundEvent::Done(payload(&kind, data)?),
        "error" => InboundEvent::Error(payload(&kind, data)?),
        _ => InboundEvent::Unrecognized { kind },
    };
    Ok(event)
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|err| DecodeError::Payload {
        kind: kind.to_string(),
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub task: String,
    pub veto_api_key: String,
    pub veto_base_url: String,
    pub llm_model: LlmModel,
    pub use_demo_policies: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider_token: Option<String>,
}

impl From<&SessionConfig> for CreateSessionRequest {
    fn from(config: &SessionConfig) -> Self {
        Self {
            task: config.task.clone(),
            veto_api_key: config.veto_api_key.clone(),
            veto_base_url: config.veto_base_url.clone(),
            llm_model: config.llm_model,
            use_demo_policies: config.use_demo_policies,
            model_provider_token: config.model_provider_token.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApprovalActionRequest {
    pub action: Resolution,
}

/// Failure body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_decision_with_camel_case_fields() {
        let event = decode_event(
            r#"{"type":"decision","data":{"action":"navigate","args":{"url":"https://example.com"},"decision":"deny","reason":"blocked domain","latencyMs":42,"mode":"cloud"}}"#,
        )
        .expect("decode decision");
        let InboundEvent::Decision(payload) = event else {
            panic!("expected decision")
        };
        assert_eq!(payload.action, "navigate");
        assert_eq!(payload.decision, Verdict::Deny);
        assert_eq!(payload.reason.as_deref(), Some("blocked domain"));
        assert_eq!(payload.latency_ms, 42);
        assert_eq!(payload.mode, "cloud");
        assert_eq!(
            payload.args.get("url"),
            Some(&serde_json::json!("https://example.com"))
        );
    }

    #[test]
    fn decodes_lifecycle_events() {
        let status = decode_event(
            r#"{"type":"status","data":{"step":3,"maxSteps":100,"state":"creating_policies"}}"#,
        )
        .expect("decode status");
        assert_eq!(
            status,
            InboundEvent::Status(StatusPayload {
                step: 3,
                max_steps: 100,
                state: AgentPhase::CreatingPolicies,
            })
        );

        let done = decode_event(r#"{"type":"done","data":{"success":false}}"#).expect("done");
        assert_eq!(done, InboundEvent::Done(DonePayload { success: false }));

        let resolved =
            decode_event(r#"{"type":"approval_resolved","data":{"id":"ap-1","decision":"deny"}}"#)
                .expect("approval_resolved");
        assert_eq!(
            resolved,
            InboundEvent::ApprovalResolved(ApprovalResolvedPayload {
                id: "ap-1".to_string(),
                decision: Resolution::Deny,
            })
        );
    }

    #[test]
    fn unknown_type_is_unrecognized_not_error() {
        let event = decode_event(r#"{"type":"screenshot","data":{"frame":"..."}}"#)
            .expect("unknown types decode");
        assert_eq!(
            event,
            InboundEvent::Unrecognized {
                kind: "screenshot".to_string()
            }
        );
        assert_eq!(event.kind(), "screenshot");
    }

    #[test]
    fn malformed_payload_surfaces_as_decode_error() {
        let err = decode_event(r#"{"type":"decision","data":{"action":"click","decision":"maybe","latencyMs":3}}"#)
            .expect_err("bad verdict");
        match err {
            DecodeError::Payload { kind, .. } => assert_eq!(kind, "decision"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = decode_event(r#"{"type":"status","data":{"step":"one"}}"#).expect_err("bad step");
        assert!(matches!(err, DecodeError::Payload { .. }));

        let err = decode_event("{not json").expect_err("bad envelope");
        assert!(matches!(err, DecodeError::Envelope(_)));
    }

    #[test]
    fn missing_data_defaults_to_empty_object() {
        let err = decode_event(r#"{"type":"done"}"#).expect_err("done needs success");
        assert!(matches!(err, DecodeError::Payload { .. }));

        let event = decode_event(r#"{"type":"heartbeat"}"#).expect("unknown without data");
        assert!(matches!(event, InboundEvent::Unrecognized { .. }));
    }

    #[test]
    fn create_request_uses_backend_field_names() {
        let config = SessionConfig {
            veto_api_key: "veto_live_123".to_string(),
            veto_base_url: "https://api.runveto.com".to_string(),
            llm_model: LlmModel::ClaudeOpus45,
            task: "find the cheapest flight".to_string(),
            use_demo_policies: true,
            model_provider_token: None,
        };
        let body = serde_json::to_value(CreateSessionRequest::from(&config)).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "task": "find the cheapest flight",
                "vetoApiKey": "veto_live_123",
                "vetoBaseUrl": "https://api.runveto.com",
                "llmModel": "claude-opus-4.5",
                "useDemoPolicies": true
            })
        );

        let with_token = CreateSessionRequest {
            model_provider_token: Some("sk-test".to_string()),
            ..CreateSessionRequest::from(&config)
        };
        let body = serde_json::to_value(with_token).expect("serialize");
        assert_eq!(body["modelProviderToken"], "sk-test");
    }
}
