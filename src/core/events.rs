/// Runtime event watcher
///
/// Follows the runtime's event stream outside the normal poll cadence,
/// drops cached counters for containers that died or were removed, and
/// forwards every event to whoever is listening (dashboard, publisher).

use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::collector::MetricsCollector;
use crate::core::runtime::ContainerEvent;

const EVENT_BUFFER: usize = 64;
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Actions after which a container's cumulative counters are meaningless
pub fn invalidates_counters(action: &str) -> bool {
    matches!(action, "die" | "destroy" | "kill" | "oom")
}

/// Actions that change which containers are running
pub fn changes_roster(action: &str) -> bool {
    matches!(
        action,
        "start" | "die" | "destroy" | "create" | "stop" | "pause" | "unpause" | "restart"
    )
}

/// Spawn the watcher; the receiver yields events until `cancel` fires
pub fn watch_events(collector: MetricsCollector, cancel: CancellationToken) -> mpsc::Receiver<ContainerEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        loop {
            let mut events = collector.runtime().events();
            info!("subscribed to runtime events");

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = events.next() => next,
                };

                match next {
                    Some(Ok(event)) => {
                        if invalidates_counters(&event.action) && collector.forget(&event.container_id).await {
                            debug!(container = %event.container_id, action = %event.action, "dropped cached counters");
                        }
                        match tx.try_send(event) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(event)) => {
                                debug!(
                                    container = %event.container_id,
                                    action = %event.action,
                                    "event listener lagging, dropping event"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => return,
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "runtime event stream failed");
                        break;
                    }
                    None => break,
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    });

    rx
}
