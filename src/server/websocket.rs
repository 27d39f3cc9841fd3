/// WebSocket subscriber connections
///
/// Each connection is a reader/writer pair around one hub subscriber. The
/// writer drains the subscriber queue (coalescing whatever is already queued
/// into one frame) and sends keepalive pings; the reader enforces the read
/// deadline and handles the client vocabulary.

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth::bearer_token;
use super::hub::{drain_batch, ClientMessage, Envelope, Hub, SubscriberHandle, SubscriberId};
use super::AppState;
use crate::core::error::MonitorError;
use crate::core::runtime::ContainerRuntime;
use crate::utils::{short_id, LOG_FOLLOW_TAIL};

#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    pub ping_interval: Duration,
    pub read_deadline: Duration,
    pub max_message_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let token = bearer_token(&headers).or(query.token);
    let owner = state.owners.resolve(token.as_deref()).to_string();
    let settings = state.ws_settings();

    ws.max_message_size(settings.max_message_bytes)
        .max_frame_size(settings.max_message_bytes)
        .on_upgrade(move |socket| serve_subscriber(socket, state, owner, settings))
}

async fn serve_subscriber(socket: WebSocket, state: AppState, owner: String, settings: WsSettings) {
    let handle = match state.hub.register(&owner).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(owner = %owner, error = %e, "rejecting connection");
            return;
        }
    };
    let id = handle.id;
    let cancel = state.cancel.child_token();
    let (sink, stream) = socket.split();

    let writer = tokio::spawn(write_loop(sink, handle, settings.ping_interval, cancel.clone()));

    let connection = Connection::new(id, state.hub.clone(), state.collector.runtime().clone(), cancel);
    connection.read_until_closed(stream, settings.read_deadline).await;
    let _ = writer.await;
}

/// Drain the subscriber queue into the socket, pinging every `ping_interval`
async fn write_loop<S>(mut sink: S, mut handle: SubscriberHandle, ping_interval: Duration, cancel: CancellationToken)
where
    S: Sink<Message> + Unpin,
{
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = handle.queue.recv() => {
                let Some(first) = frame else {
                    // unregistered or evicted
                    break;
                };
                let batch = drain_batch(&mut handle.queue, first);
                if sink.send(Message::Text(batch)).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    cancel.cancel();
}

/// Per-connection client state
struct Connection {
    id: SubscriberId,
    hub: Hub,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
    follow: Option<CancellationToken>,
}

impl Connection {
    fn new(id: SubscriberId, hub: Hub, runtime: Arc<dyn ContainerRuntime>, cancel: CancellationToken) -> Self {
        Self {
            id,
            hub,
            runtime,
            cancel,
            follow: None,
        }
    }

    /// Handle inbound frames until the peer leaves, a read fails, the read
    /// deadline passes without a frame, or the server shuts down. Always
    /// ends with the subscriber unregistered.
    async fn read_until_closed<S, E>(mut self, mut stream: S, read_deadline: Duration)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: std::fmt::Display,
    {
        let deadline = sleep(read_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = &mut deadline => {
                    info!(subscriber = self.id, "read deadline expired");
                    break;
                }
                msg = stream.next() => {
                    deadline.as_mut().reset(Instant::now() + read_deadline);
                    match msg {
                        Some(Ok(Message::Text(text))) => self.on_text(&text).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(subscriber = self.id, error = %e, "read failed");
                            break;
                        }
                    }
                }
            }
        }

        self.stop_follow();
        self.cancel.cancel();
        if let Err(e) = self.hub.unregister(self.id).await {
            debug!(subscriber = self.id, error = %e, "unregister after disconnect failed");
        }
    }

    async fn on_text(&mut self, text: &str) {
        match ClientMessage::parse(text) {
            Some(ClientMessage::Ping) => {
                if let Err(e) = self.hub.send_to_subscriber(self.id, &Envelope::pong()).await {
                    debug!(subscriber = self.id, error = %e, "pong dropped");
                }
            }
            Some(ClientMessage::SubscribeInstance { instance_id }) => {
                self.stop_follow();
                let token = self.cancel.child_token();
                self.follow = Some(token.clone());

                if let Err(e) = self
                    .hub
                    .send_to_subscriber(self.id, &Envelope::subscribed(&instance_id))
                    .await
                {
                    debug!(subscriber = self.id, error = %e, "subscribe ack dropped");
                }
                tokio::spawn(follow_logs(
                    self.hub.clone(),
                    self.runtime.clone(),
                    self.id,
                    instance_id,
                    token,
                ));
            }
            Some(ClientMessage::UnsubscribeInstance) => self.stop_follow(),
            None => debug!(subscriber = self.id, "ignoring unrecognised message"),
        }
    }

    fn stop_follow(&mut self) {
        if let Some(token) = self.follow.take() {
            token.cancel();
        }
    }
}

/// Forward a container's log lines to one subscriber until cancelled
async fn follow_logs(
    hub: Hub,
    runtime: Arc<dyn ContainerRuntime>,
    subscriber: SubscriberId,
    instance_id: String,
    cancel: CancellationToken,
) {
    let mut logs = runtime.logs(&instance_id, LOG_FOLLOW_TAIL);
    debug!(subscriber, container = %short_id(&instance_id), "following logs");

    loop {
        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            entry = logs.next() => entry,
        };

        match entry {
            Some(Ok(entry)) => {
                let envelope = match Envelope::log(&entry) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "failed to encode log line");
                        continue;
                    }
                };
                match hub.send_to_subscriber(subscriber, &envelope).await {
                    Ok(()) | Err(MonitorError::QueueFull(_)) => {}
                    Err(_) => break,
                }
            }
            Some(Err(e)) => {
                debug!(subscriber, container = %short_id(&instance_id), error = %e, "log follow ended");
                break;
            }
            None => break,
        }
    }
}
