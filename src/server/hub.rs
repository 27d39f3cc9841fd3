/// Distribution hub for WebSocket subscribers
///
/// A single registry-owner task performs every structural change (register,
/// unregister, broadcast-time eviction). Targeted sends only take the shared
/// read lock. Each subscriber has a bounded queue of pre-serialized JSON
/// frames; a full queue drops the message instead of waiting, so one slow
/// connection never stalls the others or the publisher.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{MonitorError, MonitorResult};
use crate::core::metrics::ContainerMetrics;
use crate::core::runtime::{ContainerEvent, LogEntry};

pub type SubscriberId = u64;

/// Serialized frame shared between all queues it was delivered to
pub type Frame = Arc<str>;

const COMMAND_BUFFER: usize = 64;

/// `{type, payload}` frame exchanged with clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(kind: &str, payload: &T) -> MonitorResult<Self> {
        Ok(Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn instance_update(metrics: &ContainerMetrics) -> MonitorResult<Self> {
        Self::new("instance_update", metrics)
    }

    pub fn container_event(event: &ContainerEvent) -> MonitorResult<Self> {
        Self::new("container_event", event)
    }

    pub fn log(entry: &LogEntry) -> MonitorResult<Self> {
        Self::new("log", entry)
    }

    pub fn pong() -> Self {
        Self {
            kind: "pong".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn subscribed(instance_id: &str) -> Self {
        Self {
            kind: "subscribed".to_string(),
            payload: serde_json::json!({ "instance_id": instance_id }),
        }
    }

    pub fn encode(&self) -> MonitorResult<Frame> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

/// Messages a client may send; anything else is ignored
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping,
    SubscribeInstance { instance_id: String },
    UnsubscribeInstance,
}

impl ClientMessage {
    /// `None` for malformed JSON, unknown types, or a subscribe without an id
    pub fn parse(text: &str) -> Option<Self> {
        let envelope: Envelope = serde_json::from_str(text).ok()?;
        match envelope.kind.as_str() {
            "ping" => Some(ClientMessage::Ping),
            "subscribe_instance" => {
                let instance_id = envelope.payload.get("instance_id")?.as_str()?;
                if instance_id.is_empty() {
                    return None;
                }
                Some(ClientMessage::SubscribeInstance {
                    instance_id: instance_id.to_string(),
                })
            }
            "unsubscribe_instance" => Some(ClientMessage::UnsubscribeInstance),
            _ => None,
        }
    }
}

/// Receiving side of one subscriber, handed to its writer task
#[derive(Debug)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub owner: String,
    pub queue: mpsc::Receiver<Frame>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: Vec<SubscriberId>,
}

struct Subscriber {
    owner: String,
    queue: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<SubscriberId, Subscriber>,
    owners: HashMap<String, HashSet<SubscriberId>>,
}

impl Registry {
    fn insert(&mut self, id: SubscriberId, owner: String, queue: mpsc::Sender<Frame>) {
        self.owners.entry(owner.clone()).or_default().insert(id);
        self.subscribers.insert(id, Subscriber { owner, queue });
    }

    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.owners.get_mut(&subscriber.owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.owners.remove(&subscriber.owner);
            }
        }
        true
    }
}

enum Command {
    Register {
        owner: String,
        ack: oneshot::Sender<SubscriberHandle>,
    },
    Unregister {
        id: SubscriberId,
        ack: oneshot::Sender<bool>,
    },
    Broadcast {
        frame: Frame,
        ack: oneshot::Sender<BroadcastReport>,
    },
}

#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    registry: Arc<RwLock<Registry>>,
}

impl Hub {
    /// Start the registry-owner task; it stops (closing every queue) on `cancel`
    pub fn spawn(queue_capacity: usize, cancel: CancellationToken) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let registry = Arc::new(RwLock::new(Registry::default()));

        tokio::spawn(run_owner(rx, registry.clone(), queue_capacity.max(1), cancel));

        Self { commands, registry }
    }

    pub async fn register(&self, owner: &str) -> MonitorResult<SubscriberHandle> {
        let (ack, done) = oneshot::channel();
        self.command(Command::Register {
            owner: owner.to_string(),
            ack,
        })
        .await?;
        done.await.map_err(|_| MonitorError::HubClosed)
    }

    /// Remove a subscriber; its writer sees the queue close. Idempotent.
    pub async fn unregister(&self, id: SubscriberId) -> MonitorResult<bool> {
        let (ack, done) = oneshot::channel();
        self.command(Command::Unregister { id, ack }).await?;
        done.await.map_err(|_| MonitorError::HubClosed)
    }

    /// Deliver to every subscriber, evicting those whose queue is full or closed
    pub async fn broadcast_all(&self, envelope: &Envelope) -> MonitorResult<BroadcastReport> {
        let frame = envelope.encode()?;
        let (ack, done) = oneshot::channel();
        self.command(Command::Broadcast { frame, ack }).await?;
        done.await.map_err(|_| MonitorError::HubClosed)
    }

    /// Deliver to every connection of one owner; returns how many accepted it
    pub async fn send_to_owner(&self, owner: &str, envelope: &Envelope) -> MonitorResult<usize> {
        let frame = envelope.encode()?;
        let registry = self.registry.read().await;

        let Some(ids) = registry.owners.get(owner) else {
            return Ok(0);
        };

        let mut delivered = 0;
        let mut first_full = None;
        for id in ids {
            let Some(subscriber) = registry.subscribers.get(id) else {
                continue;
            };
            match subscriber.queue.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber = id, owner, "queue full, dropping message");
                    first_full.get_or_insert(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        match (delivered, first_full) {
            (0, Some(id)) => Err(MonitorError::QueueFull(id)),
            _ => Ok(delivered),
        }
    }

    /// Deliver to one subscriber (pong, log frames)
    pub async fn send_to_subscriber(&self, id: SubscriberId, envelope: &Envelope) -> MonitorResult<()> {
        let frame = envelope.encode()?;
        let registry = self.registry.read().await;
        let subscriber = registry
            .subscribers
            .get(&id)
            .ok_or(MonitorError::Disconnected(id))?;

        subscriber.queue.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                debug!(subscriber = id, "queue full, dropping message");
                MonitorError::QueueFull(id)
            }
            mpsc::error::TrySendError::Closed(_) => MonitorError::Disconnected(id),
        })
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.subscribers.len()
    }

    pub async fn owner_count(&self, owner: &str) -> usize {
        self.registry
            .read()
            .await
            .owners
            .get(owner)
            .map_or(0, HashSet::len)
    }

    async fn command(&self, command: Command) -> MonitorResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::HubClosed)
    }
}

async fn run_owner(
    mut commands: mpsc::Receiver<Command>,
    registry: Arc<RwLock<Registry>>,
    queue_capacity: usize,
    cancel: CancellationToken,
) {
    let mut next_id: SubscriberId = 1;

    loop {
        let command = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Register { owner, ack } => {
                let id = next_id;
                next_id += 1;
                let (tx, rx) = mpsc::channel(queue_capacity);
                registry.write().await.insert(id, owner.clone(), tx);
                info!(subscriber = id, owner = %owner, "subscriber registered");
                let _ = ack.send(SubscriberHandle { id, owner, queue: rx });
            }
            Command::Unregister { id, ack } => {
                let removed = registry.write().await.remove(id);
                if removed {
                    info!(subscriber = id, "subscriber unregistered");
                }
                let _ = ack.send(removed);
            }
            Command::Broadcast { frame, ack } => {
                let report = broadcast(&registry, frame).await;
                let _ = ack.send(report);
            }
        }
    }

    let mut registry = registry.write().await;
    registry.subscribers.clear();
    registry.owners.clear();
    info!("distribution hub stopped");
}

async fn broadcast(registry: &RwLock<Registry>, frame: Frame) -> BroadcastReport {
    let mut registry = registry.write().await;
    let mut report = BroadcastReport::default();

    for (id, subscriber) in &registry.subscribers {
        match subscriber.queue.try_send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = id, owner = %subscriber.owner, "queue full during broadcast, evicting");
                report.evicted.push(*id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = id, "queue closed during broadcast, evicting");
                report.evicted.push(*id);
            }
        }
    }

    for id in &report.evicted {
        registry.remove(*id);
    }
    report.evicted.sort_unstable();
    report
}

/// Join `first` with everything already queued, newline-separated, in order
pub fn drain_batch(queue: &mut mpsc::Receiver<Frame>, first: Frame) -> String {
    let mut batch = String::from(&*first);
    while let Ok(next) = queue.try_recv() {
        batch.push('\n');
        batch.push_str(&next);
    }
    batch
}
