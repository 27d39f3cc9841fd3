/// Metrics collector
///
/// Owns the per-container previous-sample cache. `collect` is the only place
/// that reads and replaces a cache entry, and it does so under one lock with
/// no runtime I/O in between, so a one-shot collect racing a stream tick for
/// the same container cannot interleave.

use futures::future::join_all;
use futures::Stream;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{MonitorError, MonitorResult};
use crate::core::metrics::{derive_metrics, ContainerMetrics, PreviousSample};
use crate::core::runtime::ContainerRuntime;
use crate::utils::short_id;

/// Live, consumer-paced sequence of metrics
///
/// Ends as soon as its cancellation token fires, even if the producer had
/// already queued an item.
pub struct MetricsStream {
    inner: ReceiverStream<ContainerMetrics>,
    cancel: CancellationToken,
}

impl MetricsStream {
    fn new(rx: mpsc::Receiver<ContainerMetrics>, cancel: CancellationToken) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            cancel,
        }
    }
}

impl Stream for MetricsStream {
    type Item = ContainerMetrics;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            self.inner.close();
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Result of one pass over all running containers
#[derive(Debug, Default)]
pub struct CollectionBatch {
    /// Ids the runtime listed as running
    pub listed: Vec<String>,
    pub metrics: Vec<ContainerMetrics>,
    pub failed: Vec<(String, MonitorError)>,
}

#[derive(Clone)]
pub struct MetricsCollector {
    runtime: Arc<dyn ContainerRuntime>,
    previous: Arc<Mutex<HashMap<String, PreviousSample>>>,
}

impl MetricsCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            previous: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Collect metrics for one container, updating its cached counters
    pub async fn collect(&self, container_id: &str) -> MonitorResult<ContainerMetrics> {
        let (identity, sample) = tokio::try_join!(
            self.runtime.inspect(container_id),
            self.runtime.stats_once(container_id),
        )?;

        let mut previous = self.previous.lock().await;
        let metrics = derive_metrics(&identity, &sample, previous.get(container_id));
        previous.insert(container_id.to_string(), PreviousSample::from(&sample));

        Ok(metrics)
    }

    /// Collect every running container; per-container failures are recorded, not fatal
    pub async fn collect_batch(&self) -> MonitorResult<CollectionBatch> {
        let listed = self.runtime.list_running().await?;

        let results = join_all(listed.iter().map(|id| async move {
            (id.clone(), self.collect(id).await)
        }))
        .await;

        let mut batch = CollectionBatch {
            listed,
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(metrics) => batch.metrics.push(metrics),
                Err(e) => {
                    if e.is_not_found() {
                        debug!(container = %short_id(&id), "container vanished during collection");
                    } else {
                        warn!(container = %short_id(&id), error = %e, "failed to collect metrics");
                    }
                    batch.failed.push((id, e));
                }
            }
        }

        Ok(batch)
    }

    /// Metrics for all running containers, omitting any that failed
    pub async fn collect_all(&self) -> MonitorResult<Vec<ContainerMetrics>> {
        Ok(self.collect_batch().await?.metrics)
    }

    /// Collect one container on a fixed interval until `cancel` fires
    pub fn stream(
        &self,
        container_id: impl Into<String>,
        every: Duration,
        cancel: CancellationToken,
    ) -> MetricsStream {
        let (tx, rx) = mpsc::channel(1);
        let collector = self.clone();
        let container_id = container_id.into();
        let stream = MetricsStream::new(rx, cancel.clone());

        tokio::spawn(async move {
            let mut ticker = ticker(every);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    r = collector.collect(&container_id) => r,
                };

                match result {
                    Ok(metrics) => {
                        if !forward(&tx, &cancel, metrics).await {
                            break;
                        }
                    }
                    Err(e) => debug!(container = %short_id(&container_id), error = %e, "skipping tick"),
                }
            }
            debug!(container = %short_id(&container_id), "metrics stream stopped");
        });

        stream
    }

    /// Collect all running containers on a fixed interval until `cancel` fires
    pub fn stream_all(&self, every: Duration, cancel: CancellationToken) -> MetricsStream {
        let (tx, rx) = mpsc::channel(1);
        let collector = self.clone();
        let stream = MetricsStream::new(rx, cancel.clone());

        tokio::spawn(async move {
            let mut ticker = ticker(every);
            'outer: loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    r = collector.collect_all() => r,
                };

                match result {
                    Ok(all) => {
                        for metrics in all {
                            if !forward(&tx, &cancel, metrics).await {
                                break 'outer;
                            }
                        }
                    }
                    Err(e) => debug!(error = %e, "skipping tick"),
                }
            }
            debug!("all-container metrics stream stopped");
        });

        stream
    }

    /// Drop the cached counters of one container
    pub async fn forget(&self, container_id: &str) -> bool {
        self.previous.lock().await.remove(container_id).is_some()
    }

    /// Keep cached counters only for the given containers
    pub async fn retain(&self, container_ids: &[String]) {
        let keep: HashSet<&str> = container_ids.iter().map(String::as_str).collect();
        self.previous.lock().await.retain(|id, _| keep.contains(id.as_str()));
    }

    /// Ids with cached counters
    pub async fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.previous.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn ticker(every: Duration) -> tokio::time::Interval {
    let every = every.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Send unless cancellation has been observed; false means stop
async fn forward(
    tx: &mpsc::Sender<ContainerMetrics>,
    cancel: &CancellationToken,
    metrics: ContainerMetrics,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(metrics) => sent.is_ok(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ticking_runtime;
    use super::*;
    use crate::core::metrics::fixtures::{identity, sample};
    use crate::core::runtime::MockContainerRuntime;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_first_collect_then_cpu_percent() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["c"], None)));

        let first = collector.collect("c").await.unwrap();
        assert_eq!(first.cpu_percent, 0.0);
        assert_eq!(first.network_rx_rate, 0.0);
        assert_eq!(first.network_rx, 1500);

        let second = collector.collect("c").await.unwrap();
        assert_eq!(second.cpu_percent, 200.0);
        assert_eq!(collector.tracked().await, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_collect_propagates_not_found() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_inspect()
            .returning(|id: &str| Err(MonitorError::NotFound(id.to_string())));
        runtime
            .expect_stats_once()
            .returning(|id: &str| Ok(sample(id, 1, 1, 1, 0)));

        let collector = MetricsCollector::new(Arc::new(runtime));
        let err = collector.collect("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(collector.tracked().await.is_empty());
    }

    #[tokio::test]
    async fn test_collect_all_omits_only_failing_container() {
        let runtime = ticking_runtime(vec!["a", "b", "c"], Some("b"));
        let collector = MetricsCollector::new(Arc::new(runtime));

        let all = collector.collect_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.container_id.as_str()).collect();
        assert_eq!(all.len(), 2);
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"c"));
        assert!(!ids.contains(&"b"));

        let batch = collector.collect_batch().await.unwrap();
        assert_eq!(batch.listed.len(), 3);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].0, "b");
    }

    #[tokio::test]
    async fn test_collect_all_fails_when_listing_fails() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_list_running()
            .returning(|| Err(MonitorError::RuntimeUnavailable("socket closed".into())));
        let collector = MetricsCollector::new(Arc::new(runtime));

        assert!(collector.collect_all().await.is_err());
    }

    #[tokio::test]
    async fn test_forget_and_retain() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["a", "b"], None)));
        collector.collect_all().await.unwrap();
        assert_eq!(collector.tracked().await, vec!["a".to_string(), "b".to_string()]);

        assert!(collector.forget("a").await);
        assert!(!collector.forget("a").await);

        collector.collect("a").await.unwrap();
        collector.retain(&["a".to_string()]).await;
        assert_eq!(collector.tracked().await, vec!["a".to_string()]);

        // a forgotten container starts over at zero
        collector.forget("a").await;
        let fresh = collector.collect("a").await.unwrap();
        assert_eq!(fresh.cpu_percent, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_emits_until_cancelled() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["c"], None)));
        let cancel = CancellationToken::new();
        let mut stream = collector.stream("c", Duration::from_secs(1), cancel.clone());

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.cpu_percent, 0.0);
        assert_eq!(second.cpu_percent, 200.0);

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_drops_item_queued_before_cancel() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["c"], None)));
        let cancel = CancellationToken::new();
        let mut stream = collector.stream("c", Duration::from_secs(1), cancel.clone());

        assert!(stream.next().await.is_some());
        // the producer fills the one-slot buffer on the next tick
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_all_ends_on_cancel() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["a", "b"], None)));
        let cancel = CancellationToken::new();
        let mut stream = collector.stream_all(Duration::from_secs(1), cancel.clone());

        assert!(stream.next().await.is_some());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_skips_failed_ticks() {
        let mut runtime = MockContainerRuntime::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        runtime.expect_inspect().returning(|id: &str| Ok(identity(id)));
        runtime.expect_stats_once().returning(move |id: &str| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Err(MonitorError::RuntimeUnavailable("timed out".into()))
            } else {
                Ok(sample(id, 1000, 10_000, 4, n as i64))
            }
        });

        let collector = MetricsCollector::new(Arc::new(runtime));
        let cancel = CancellationToken::new();
        let mut stream = collector.stream("c", Duration::from_secs(1), cancel.clone());

        let first = stream.next().await.unwrap();
        assert_eq!(first.container_id, "c");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_all_emits_each_container() {
        let collector = MetricsCollector::new(Arc::new(ticking_runtime(vec!["a", "b"], None)));
        let cancel = CancellationToken::new();
        let stream = collector.stream_all(Duration::from_secs(2), cancel.clone());

        let items: Vec<ContainerMetrics> = stream.take(4).collect().await;
        cancel.cancel();

        let a = items.iter().filter(|m| m.container_id == "a").count();
        let b = items.iter().filter(|m| m.container_id == "b").count();
        assert_eq!((a, b), (2, 2));
    }
}
