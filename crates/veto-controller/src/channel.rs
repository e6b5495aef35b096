use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;
use veto_core::{decode_event, SessionEvent};

/// A [`SessionEvent`] tagged with the channel generation that produced it.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub(crate) generation: u64,
    pub(crate) event: SessionEvent,
}

impl ChannelMessage {
    pub(crate) fn new(generation: u64, event: SessionEvent) -> Self {
        Self { generation, event }
    }
}

/// Pumps one realtime channel into `tx` until it closes or `shutdown` fires.
/// There is no reconnect: a lost channel stays lost until the next start.
pub(crate) async fn channel_loop(
    url: Url,
    generation: u64,
    tx: mpsc::Sender<ChannelMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let connect = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = stopped(&mut shutdown) => {
            debug!(event = "channel_cancelled", generation, "shutdown before connect");
            return;
        }
    };
    let (mut ws, _) = match connect {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "channel_connect_error", generation, url = %url, error = %err);
            if emit(&tx, &mut shutdown, generation, SessionEvent::ChannelFailed).await {
                emit(&tx, &mut shutdown, generation, SessionEvent::ChannelClosed).await;
            }
            return;
        }
    };
    info!(event = "channel_open", generation, url = %url);
    if !emit(&tx, &mut shutdown, generation, SessionEvent::ChannelOpened).await {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        let event = tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_event(&text) {
                    Ok(event) => {
                        debug!(event = "channel_frame", generation, kind = event.kind());
                        SessionEvent::Inbound(event)
                    }
                    Err(err) => {
                        warn!(event = "channel_decode_error", generation, error = %err);
                        SessionEvent::DecodeRejected {
                            reason: err.to_string(),
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(event = "channel_read_error", generation, error = %err);
                    if !emit(&tx, &mut shutdown, generation, SessionEvent::ChannelFailed).await {
                        return;
                    }
                    break;
                }
            },
            _ = stopped(&mut shutdown) => {
                let _ = ws.close(None).await;
                debug!(event = "channel_closed_locally", generation);
                return;
            }
        };
        if !emit(&tx, &mut shutdown, generation, event).await {
            let _ = ws.close(None).await;
            debug!(event = "channel_closed_locally", generation);
            return;
        }
    }

    info!(event = "channel_closed", generation);
    emit(&tx, &mut shutdown, generation, SessionEvent::ChannelClosed).await;
}

/// Queues one event. Returns false once shutdown fired or the consumer is gone.
async fn emit(
    tx: &mpsc::Sender<ChannelMessage>,
    shutdown: &mut watch::Receiver<bool>,
    generation: u64,
    event: SessionEvent,
) -> bool {
    tokio::select! {
        sent = tx.send(ChannelMessage::new(generation, event)) => sent.is_ok(),
        _ = stopped(shutdown) => false,
    }
}

pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
