pub mod channel;
mod commands;
pub mod endpoints;
pub mod error;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use veto_core::wire::{CreateSessionRequest, CreateSessionResponse};
use veto_core::{reduce, Resolution, SessionConfig, SessionEvent, SessionState};

pub use channel::ChannelMessage;
pub use endpoints::Endpoints;
pub use error::ControllerError;

use channel::channel_loop;
use commands::{command_loop, Command, COMMAND_QUEUE_CAPACITY};
use error::rejection;

pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub backend_url: Url,
}

struct ActiveSession {
    session_id: String,
    generation: u64,
    shutdown: watch::Sender<bool>,
    channel_task: JoinHandle<()>,
    command_tx: mpsc::Sender<Command>,
}

/// Owns the backend session, its realtime channel and the derived state.
///
/// All inbound traffic is delivered on the receiver returned by [`SessionController::new`];
/// the host loop hands each message back through [`SessionController::apply`], which folds
/// it into [`SessionState`] synchronously. At most one channel is live at a time, and
/// messages from a torn-down channel are discarded by generation.
pub struct SessionController {
    endpoints: Endpoints,
    http: reqwest::Client,
    state: SessionState,
    session: Option<ActiveSession>,
    closing: Vec<JoinHandle<()>>,
    next_generation: u64,
    events_tx: mpsc::Sender<ChannelMessage>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<ChannelMessage>), ControllerError> {
        let endpoints = Endpoints::new(config.backend_url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("veto-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let controller = Self {
            endpoints,
            http,
            state: SessionState::default(),
            session: None,
            closing: Vec::new(),
            next_generation: 0,
            events_tx,
        };
        Ok((controller, events_rx))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.session_id.as_str())
    }

    pub fn is_channel_live(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| !session.channel_task.is_finished())
            .unwrap_or(false)
    }

    pub async fn health(&self) -> Result<(), ControllerError> {
        let response = self.http.get(self.endpoints.health()?).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    /// Tears down any current session, resets derived state and creates a new session.
    /// The realtime channel is opened only when creation succeeds.
    pub async fn start(&mut self, config: SessionConfig) -> Result<String, ControllerError> {
        self.teardown();
        for handle in std::mem::take(&mut self.closing) {
            let _ = handle.await;
        }
        self.state = SessionState::default();

        let created = match self.create_session(&config).await {
            Ok(session_id) => self
                .endpoints
                .channel(&session_id)
                .map(|channel_url| (session_id, channel_url)),
            Err(err) => Err(err),
        };
        match created {
            Ok((session_id, channel_url)) => {
                info!(
                    event = "session_created",
                    session_id = %session_id,
                    model = %config.llm_model,
                    demo_policies = config.use_demo_policies
                );
                self.fold(SessionEvent::SessionCreated {
                    session_id: session_id.clone(),
                });
                self.open(session_id.clone(), channel_url);
                Ok(session_id)
            }
            Err(err) => {
                warn!(event = "session_rejected", error = %err);
                self.fold(SessionEvent::CreateFailed {
                    message: err.operator_message(),
                });
                Err(err)
            }
        }
    }

    pub fn approve(&mut self, approval_id: &str) -> bool {
        self.queue_command(Command::Resolve {
            approval_id: approval_id.to_string(),
            resolution: Resolution::Approve,
        })
    }

    pub fn deny(&mut self, approval_id: &str) -> bool {
        self.queue_command(Command::Resolve {
            approval_id: approval_id.to_string(),
            resolution: Resolution::Deny,
        })
    }

    /// Requests a stop. The phase changes only when the backend reports it.
    pub fn stop(&mut self) -> bool {
        self.queue_command(Command::Stop)
    }

    pub fn reset(&mut self) {
        self.teardown();
        self.state = SessionState::default();
        info!(event = "session_reset");
    }

    /// Folds one queued message into state. Returns the applied event, or `None` when the
    /// message belongs to a channel that is no longer live.
    pub fn apply(&mut self, message: ChannelMessage) -> Option<SessionEvent> {
        let live = self.session.as_ref().map(|session| session.generation);
        if live != Some(message.generation) {
            debug!(
                event = "stale_event_dropped",
                generation = message.generation,
                live_generation = ?live
            );
            return None;
        }
        let event = message.event;
        self.fold(event.clone());
        Some(event)
    }

    async fn create_session(&self, config: &SessionConfig) -> Result<String, ControllerError> {
        let response = self
            .http
            .post(self.endpoints.create_session()?)
            .json(&CreateSessionRequest::from(config))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|err| ControllerError::MalformedResponse(err.to_string()))?;
        Ok(body.session_id)
    }

    fn open(&mut self, session_id: String, channel_url: Url) {
        self.next_generation = self.next_generation.saturating_add(1);
        let generation = self.next_generation;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let channel_task = tokio::spawn(channel_loop(
            channel_url,
            generation,
            self.events_tx.clone(),
            shutdown_rx.clone(),
        ));

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(command_loop(
            self.http.clone(),
            self.endpoints.clone(),
            session_id.clone(),
            generation,
            command_rx,
            self.events_tx.clone(),
            shutdown_rx,
        ));

        self.session = Some(ActiveSession {
            session_id,
            generation,
            shutdown,
            channel_task,
            command_tx,
        });
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(
                event = "session_teardown",
                session_id = %session.session_id,
                generation = session.generation
            );
            let _ = session.shutdown.send(true);
            self.closing.push(session.channel_task);
        }
        self.closing.retain(|handle| !handle.is_finished());
    }

    fn queue_command(&mut self, command: Command) -> bool {
        let name = command.name();
        let Some(session) = self.session.as_ref() else {
            debug!(event = "command_ignored", command = name, reason = "no_session");
            return false;
        };
        let message = match session.command_tx.try_send(command) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    event = "command_queue_drop",
                    reason = "queue_full",
                    command = name,
                    capacity = COMMAND_QUEUE_CAPACITY
                );
                "command queue full"
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    event = "command_queue_drop",
                    reason = "channel_closed",
                    command = name
                );
                "command channel closed"
            }
        };
        self.fold(SessionEvent::CommandFailed {
            command: name.to_string(),
            message: message.to_string(),
        });
        false
    }

    fn fold(&mut self, event: SessionEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, event, Utc::now());
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}
