/// Container runtime adapter
///
/// `ContainerRuntime` is the narrow seam between the collector and the
/// container engine. `DockerRuntime` implements it over the Docker Engine API
/// (bollard); every one-shot call is wrapped in its own timeout so a hung
/// daemon cannot stall a polling loop.

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogOutput, LogsOptions, MemoryStatsStats,
    RestartContainerOptions, StartContainerOptions, Stats, StatsOptions, StopContainerOptions,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::core::error::{MonitorError, MonitorResult};
use crate::core::metrics::{BlockIoEntry, ContainerIdentity, InterfaceCounters, RawCounterSample};
use crate::utils::LifecycleState;

/// Basic listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: LifecycleState,
    pub status: String,
}

/// A runtime event (start, die, destroy, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub container_id: String,
    pub container_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// One line of container output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub container_id: String,
    pub timestamp: DateTime<Utc>,
    /// "stdout" or "stderr"
    pub stream: String,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Name and lifecycle state of one container
    async fn inspect(&self, container_id: &str) -> MonitorResult<ContainerIdentity>;

    /// One-shot cumulative counters of one container
    async fn stats_once(&self, container_id: &str) -> MonitorResult<RawCounterSample>;

    /// Ids of running containers
    async fn list_running(&self) -> MonitorResult<Vec<String>>;

    /// All containers (`all = true`) or running ones
    async fn list_containers(&self, all: bool) -> MonitorResult<Vec<ContainerSummary>>;

    /// Lazy, unbounded stream of container events
    fn events(&self) -> BoxStream<'static, MonitorResult<ContainerEvent>>;

    /// Follow a container's output, starting with the last `tail` lines
    fn logs(&self, container_id: &str, tail: usize) -> BoxStream<'static, MonitorResult<LogEntry>>;

    /// Liveness of the runtime itself
    async fn ping(&self) -> MonitorResult<()>;
}

/// Start/stop delegation used by the dashboard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifecycleControl: Send + Sync {
    async fn start(&self, container_id: &str) -> MonitorResult<()>;
    async fn stop(&self, container_id: &str) -> MonitorResult<()>;
    async fn restart(&self, container_id: &str) -> MonitorResult<()>;
}

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    timeout: Duration,
}

impl DockerRuntime {
    /// Connect using the local defaults (DOCKER_HOST or the unix socket)
    pub fn connect(timeout: Duration) -> MonitorResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| MonitorError::RuntimeUnavailable(format!("failed to connect to Docker: {}", e)))?;
        Ok(Self { docker, timeout })
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> MonitorResult<T>
    where
        F: Future<Output = Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(MonitorError::from),
            Err(_) => Err(MonitorError::RuntimeUnavailable(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container_id: &str) -> MonitorResult<ContainerIdentity> {
        let info = self
            .bounded(
                "inspect",
                self.docker
                    .inspect_container(container_id, None::<InspectContainerOptions>),
            )
            .await?;

        let state = info
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|status| LifecycleState::from(status.to_string().as_str()))
            .unwrap_or_default();

        Ok(ContainerIdentity {
            id: info.id.unwrap_or_else(|| container_id.to_string()),
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| container_id.to_string()),
            state,
        })
    }

    async fn stats_once(&self, container_id: &str) -> MonitorResult<RawCounterSample> {
        let mut stream = self.docker.stats(
            container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );

        let next = tokio::time::timeout(self.timeout, stream.next())
            .await
            .map_err(|_| {
                MonitorError::RuntimeUnavailable(format!("stats timed out after {:?}", self.timeout))
            })?;

        match next {
            Some(Ok(stats)) => Ok(raw_sample_from_stats(container_id, stats)),
            Some(Err(e)) => Err(e.into()),
            None => Err(MonitorError::RuntimeUnavailable(
                "stats stream ended without a sample".to_string(),
            )),
        }
    }

    async fn list_running(&self) -> MonitorResult<Vec<String>> {
        let summaries = self.list_containers(false).await?;
        Ok(summaries.into_iter().map(|c| c.id).collect())
    }

    async fn list_containers(&self, all: bool) -> MonitorResult<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        if !all {
            filters.insert("status".to_string(), vec!["running".to_string()]);
        }

        let options = Some(ListContainersOptions {
            all,
            filters,
            ..Default::default()
        });

        let containers = self
            .bounded("list", self.docker.list_containers(options))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.chars().take(12).collect());
                Some(ContainerSummary {
                    id,
                    name,
                    image: c.image.unwrap_or_else(|| "unknown".to_string()),
                    state: c.state.as_deref().map(LifecycleState::from).unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                })
            })
            .collect())
    }

    fn events(&self) -> BoxStream<'static, MonitorResult<ContainerEvent>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);

        self.docker
            .events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }))
            .map(|item| {
                let event = item?;
                let actor = event.actor.unwrap_or_default();
                let attributes = actor.attributes.unwrap_or_default();
                let timestamp = match (event.time_nano, event.time) {
                    (Some(nanos), _) => Utc.timestamp_nanos(nanos),
                    (None, Some(secs)) => Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now),
                    _ => Utc::now(),
                };
                Ok(ContainerEvent {
                    container_id: actor.id.unwrap_or_default(),
                    container_name: attributes.get("name").cloned().unwrap_or_default(),
                    kind: event.typ.map(|t| t.to_string()).unwrap_or_default(),
                    action: event.action.unwrap_or_default(),
                    timestamp,
                    attributes,
                })
            })
            .boxed()
    }

    fn logs(&self, container_id: &str, tail: usize) -> BoxStream<'static, MonitorResult<LogEntry>> {
        let id = container_id.to_string();
        self.docker
            .logs(
                container_id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    timestamps: true,
                    tail: tail.to_string(),
                    ..Default::default()
                }),
            )
            .map(move |item| {
                let output = item?;
                let stream = match output {
                    LogOutput::StdErr { .. } => "stderr",
                    _ => "stdout",
                };
                Ok(parse_log_line(&id, stream, &output.to_string()))
            })
            .boxed()
    }

    async fn ping(&self) -> MonitorResult<()> {
        self.bounded("ping", self.docker.ping()).await.map(|_| ())
    }
}

#[async_trait]
impl LifecycleControl for DockerRuntime {
    async fn start(&self, container_id: &str) -> MonitorResult<()> {
        self.bounded(
            "start",
            self.docker
                .start_container(container_id, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn stop(&self, container_id: &str) -> MonitorResult<()> {
        self.bounded(
            "stop",
            self.docker
                .stop_container(container_id, Some(StopContainerOptions { t: 10 })),
        )
        .await
    }

    async fn restart(&self, container_id: &str) -> MonitorResult<()> {
        self.bounded(
            "restart",
            self.docker
                .restart_container(container_id, Some(RestartContainerOptions { t: 10 })),
        )
        .await
    }
}

/// Convert a Docker stats document into cumulative counters
pub fn raw_sample_from_stats(container_id: &str, stats: Stats) -> RawCounterSample {
    let memory_cache = match stats.memory_stats.stats {
        Some(MemoryStatsStats::V1(v1)) => v1.cache,
        Some(MemoryStatsStats::V2(v2)) => v2.inactive_file,
        None => 0,
    };

    let networks = stats
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, net)| InterfaceCounters {
            name,
            rx_bytes: net.rx_bytes,
            tx_bytes: net.tx_bytes,
        })
        .collect();

    let block_io = stats
        .blkio_stats
        .io_service_bytes_recursive
        .unwrap_or_default()
        .into_iter()
        .map(|entry| BlockIoEntry {
            major: entry.major,
            minor: entry.minor,
            op: entry.op,
            value: entry.value,
        })
        .collect();

    let timestamp = DateTime::parse_from_rfc3339(&stats.read)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    RawCounterSample {
        container_id: container_id.to_string(),
        cpu_total_usage: stats.cpu_stats.cpu_usage.total_usage,
        system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
        online_cpus: stats.cpu_stats.online_cpus.map(|n| n as u32),
        per_cpu_entries: stats
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len())
            .unwrap_or(0),
        memory_usage: stats.memory_stats.usage.unwrap_or(0),
        memory_cache,
        memory_limit: stats.memory_stats.limit.unwrap_or(0),
        networks,
        block_io,
        pids: stats.pids_stats.current.unwrap_or(0),
        timestamp,
    }
}

/// Split the RFC3339 prefix that `timestamps: true` adds to each line
pub fn parse_log_line(container_id: &str, stream: &str, line: &str) -> LogEntry {
    let line = line.trim_end();
    let (timestamp, message) = match line.split_once(' ') {
        Some((ts, rest)) => match DateTime::parse_from_rfc3339(ts) {
            Ok(parsed) => (parsed.with_timezone(&Utc), rest),
            Err(_) => (Utc::now(), line),
        },
        None => (Utc::now(), line),
    };

    LogEntry {
        container_id: container_id.to_string(),
        timestamp,
        stream: stream.to_string(),
        message: message.trim().to_string(),
    }
}
