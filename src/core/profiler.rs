/// Resource profiling and limit recommendations
///
/// A profiling session accumulates CPU and memory samples for one container
/// and recommends limits from the 95th percentile of what it observed:
/// CPU gets 10% headroom, memory 25%, with floors of 0.1% and 128 MB.
/// Session length is bounded by the caller (see `profile_container`).

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::collector::MetricsCollector;
use crate::core::metrics::ContainerMetrics;

const BYTES_PER_MB: u64 = 1024 * 1024;
const CPU_HEADROOM: f64 = 1.1;
const MEMORY_HEADROOM: f64 = 1.25;
const MIN_CPU_LIMIT: f64 = 0.1;
const MIN_MEMORY_LIMIT_MB: u64 = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub cpu_limit: f64,
    pub memory_limit_mb: u64,
    pub p95_cpu: f64,
    pub p95_memory_mb: u64,
    pub basis_count: usize,
}

impl Recommendation {
    pub fn reason(&self) -> String {
        format!(
            "Based on {} samples. P95 CPU: {:.2}%, P95 Mem: {}MB",
            self.basis_count, self.p95_cpu, self.p95_memory_mb
        )
    }

    /// devcontainer.json `hostRequirements` block for these limits
    pub fn host_requirements(&self) -> serde_json::Value {
        serde_json::json!({
            "hostRequirements": {
                "cpus": (self.cpu_limit * 10.0).round() / 10.0,
                "memory": format!("{}mb", self.memory_limit_mb),
            }
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct Profiler {
    samples: Vec<Sample>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, metrics: &ContainerMetrics) {
        self.samples.push(Sample {
            timestamp: Utc::now(),
            cpu_percent: metrics.cpu_percent,
            memory_bytes: metrics.memory_used,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Percentile-based recommendation; `None` means not enough data
    pub fn analyze(&self) -> Option<Recommendation> {
        if self.samples.is_empty() {
            return None;
        }

        let mut cpu: Vec<f64> = self.samples.iter().map(|s| s.cpu_percent).collect();
        cpu.sort_by(|a, b| a.total_cmp(b));
        let p95_cpu = cpu[p95_index(cpu.len())];

        let mut memory: Vec<u64> = self.samples.iter().map(|s| s.memory_bytes).collect();
        memory.sort_unstable();
        let p95_memory_mb = memory[p95_index(memory.len())] / BYTES_PER_MB;

        let cpu_limit = (p95_cpu * CPU_HEADROOM).max(MIN_CPU_LIMIT);
        let memory_limit_mb = ((p95_memory_mb as f64 * MEMORY_HEADROOM).round() as u64).max(MIN_MEMORY_LIMIT_MB);

        Some(Recommendation {
            cpu_limit,
            memory_limit_mb,
            p95_cpu,
            p95_memory_mb,
            basis_count: self.samples.len(),
        })
    }
}

fn p95_index(len: usize) -> usize {
    ((len as f64 * 0.95) as usize).min(len - 1)
}

/// Outcome of a time-boxed profiling session
#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub container_id: String,
    pub samples: usize,
    pub recommendation: Option<Recommendation>,
}

/// Profile one container for at most `duration`, sampling every `interval`
///
/// `on_sample` sees every accepted sample (progress display). The session
/// also ends early when `cancel` fires.
pub async fn profile_container<F>(
    collector: &MetricsCollector,
    container_id: &str,
    duration: Duration,
    interval: Duration,
    cancel: CancellationToken,
    mut on_sample: F,
) -> ProfileReport
where
    F: FnMut(usize, &ContainerMetrics),
{
    let session = cancel.child_token();
    let mut stream = collector.stream(container_id, interval, session.clone());
    let mut profiler = Profiler::new();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = session.cancelled() => break,
            next = stream.next() => match next {
                Some(metrics) => {
                    profiler.add_sample(&metrics);
                    on_sample(profiler.len(), &metrics);
                }
                None => break,
            },
        }
    }
    session.cancel();

    ProfileReport {
        container_id: container_id.to_string(),
        samples: profiler.len(),
        recommendation: profiler.analyze(),
    }
}
