/// Bridges collection and runtime events into hub broadcasts

use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::{Envelope, Hub};
use crate::core::collector::MetricsCollector;
use crate::core::error::MonitorError;
use crate::core::events::watch_events;

/// Broadcast `instance_update` every `interval` and `container_event` as they happen
pub fn spawn_publisher(
    collector: MetricsCollector,
    hub: Hub,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut metrics = collector.stream_all(interval, cancel.clone());
        let mut events = watch_events(collector.clone(), cancel.clone());
        info!(interval = ?interval, "publisher started");

        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => Envelope::container_event(&event),
                    None => break,
                },
                update = metrics.next() => match update {
                    Some(update) => Envelope::instance_update(&update),
                    None => break,
                },
            };

            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "failed to encode update");
                    continue;
                }
            };

            match hub.broadcast_all(&envelope).await {
                Ok(report) if !report.evicted.is_empty() => {
                    debug!(kind = %envelope.kind, evicted = report.evicted.len(), "slow subscribers evicted");
                }
                Ok(_) => {}
                Err(MonitorError::HubClosed) => break,
                Err(e) => warn!(error = %e, "broadcast failed"),
            }
        }

        info!("publisher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::test_support::ticking_runtime;
    use crate::core::runtime::ContainerEvent;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_publisher_broadcasts_updates_and_events() {
        let mut runtime = ticking_runtime(vec!["web"], None);
        runtime.expect_events().returning(|| {
            futures::stream::iter(vec![Ok(ContainerEvent {
                container_id: "web".to_string(),
                container_name: "web-name".to_string(),
                kind: "container".to_string(),
                action: "restart".to_string(),
                timestamp: Utc::now(),
                attributes: HashMap::new(),
            })])
            .chain(futures::stream::pending())
            .boxed()
        });

        let cancel = CancellationToken::new();
        let hub = Hub::spawn(16, cancel.clone());
        let mut sub = hub.register("anonymous").await.unwrap();
        let publisher = spawn_publisher(
            MetricsCollector::new(Arc::new(runtime)),
            hub.clone(),
            Duration::from_secs(2),
            cancel.clone(),
        );

        let mut kinds = Vec::new();
        while kinds.len() < 2 {
            let frame = sub.queue.recv().await.unwrap();
            let envelope: Envelope = serde_json::from_str(&frame).unwrap();
            if envelope.kind == "instance_update" {
                assert_eq!(envelope.payload["container_id"], "web");
            }
            kinds.push(envelope.kind);
        }
        kinds.sort();
        assert_eq!(kinds, vec!["container_event", "instance_update"]);

        cancel.cancel();
        publisher.await.unwrap();
    }
}
