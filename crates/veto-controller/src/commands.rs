use crate::channel::{stopped, ChannelMessage};
use crate::endpoints::Endpoints;
use crate::error::{rejection, ControllerError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use veto_core::wire::ApprovalActionRequest;
use veto_core::{Resolution, SessionEvent};

pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Resolve {
        approval_id: String,
        resolution: Resolution,
    },
    Stop,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Resolve { resolution, .. } => resolution.as_str(),
            Command::Stop => "stop",
        }
    }
}

/// Sends queued commands for one session, in order. Outcomes are never folded into
/// state; only failures come back, as `CommandFailed` warnings. Once `shutdown` fires,
/// commands still waiting in the queue are discarded; a request already in flight completes.
pub(crate) async fn command_loop(
    http: reqwest::Client,
    endpoints: Endpoints,
    session_id: String,
    generation: u64,
    mut rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<ChannelMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => {
                let discarded = drain(&mut rx);
                debug!(event = "command_worker_stopped", session_id = %session_id, discarded);
                return;
            }
            command = rx.recv() => match command {
                Some(command) => command,
                None => return,
            },
        };
        let name = command.name();
        match dispatch(&http, &endpoints, &session_id, command).await {
            Ok(()) => {
                debug!(event = "command_sent", command = name, session_id = %session_id);
            }
            Err(err) => {
                warn!(
                    event = "command_failed",
                    command = name,
                    session_id = %session_id,
                    error = %err
                );
                let failure = SessionEvent::CommandFailed {
                    command: name.to_string(),
                    message: err.operator_message(),
                };
                let _ = tx.send(ChannelMessage::new(generation, failure)).await;
            }
        }
    }
}

fn drain(rx: &mut mpsc::Receiver<Command>) -> usize {
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

async fn dispatch(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    session_id: &str,
    command: Command,
) -> Result<(), ControllerError> {
    let request = match command {
        Command::Resolve {
            approval_id,
            resolution,
        } => http
            .post(endpoints.approve(session_id, &approval_id)?)
            .json(&ApprovalActionRequest { action: resolution }),
        Command::Stop => http.post(endpoints.stop(session_id)?),
    };
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(rejection(response).await);
    }
    Ok(())
}
