use thiserror::Error;
use veto_core::wire::ErrorBody;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Backend answered with a non-2xx status.
    #[error("{0}")]
    Rejected(String),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl ControllerError {
    /// Text surfaced to the operator as the session error.
    pub fn operator_message(&self) -> String {
        match self {
            ControllerError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Turns a non-2xx response into [`ControllerError::Rejected`], preferring the
/// backend's `detail` field over a synthesized `HTTP <status>`.
pub(crate) async fn rejection(response: reqwest::Response) -> ControllerError {
    let status = response.status();
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .filter(|detail| !detail.trim().is_empty());
    ControllerError::Rejected(detail.unwrap_or_else(|| format!("HTTP {}", status.as_u16())))
}
