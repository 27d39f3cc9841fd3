/// Container metrics model and the counter differencing that produces it
///
/// The runtime reports cumulative counters (CPU nanoseconds, bytes sent,
/// bytes read). Rates and percentages are derived by differencing the
/// current sample against the previous one recorded for the same container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::LifecycleState;

/// Identity metadata returned by an inspect call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIdentity {
    pub id: String,
    pub name: String,
    pub state: LifecycleState,
}

/// Cumulative byte counters for one network interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One entry of the block device service-bytes list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIoEntry {
    pub major: u64,
    pub minor: u64,
    pub op: String,
    pub value: u64,
}

/// Cumulative counters of one container at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct RawCounterSample {
    pub container_id: String,
    pub cpu_total_usage: u64,
    pub system_cpu_usage: u64,
    /// `None` when the runtime omits the field
    pub online_cpus: Option<u32>,
    /// Number of per-core usage entries, used when `online_cpus` is missing
    pub per_cpu_entries: usize,
    pub memory_usage: u64,
    pub memory_cache: u64,
    pub memory_limit: u64,
    pub networks: Vec<InterfaceCounters>,
    pub block_io: Vec<BlockIoEntry>,
    pub pids: u64,
    pub timestamp: DateTime<Utc>,
}

impl RawCounterSample {
    /// CPU count used for percentage scaling; 0 means it cannot be computed
    pub fn cpu_count(&self) -> u32 {
        match self.online_cpus {
            Some(n) if n > 0 => n,
            _ => self.per_cpu_entries as u32,
        }
    }

    pub fn network_totals(&self) -> (u64, u64) {
        self.networks.iter().fold((0, 0), |(rx, tx), iface| {
            (rx + iface.rx_bytes, tx + iface.tx_bytes)
        })
    }

    pub fn block_totals(&self) -> (u64, u64) {
        self.block_io.iter().fold((0, 0), |(read, write), entry| {
            if entry.op.eq_ignore_ascii_case("read") {
                (read + entry.value, write)
            } else if entry.op.eq_ignore_ascii_case("write") {
                (read, write + entry.value)
            } else {
                (read, write)
            }
        })
    }
}

/// Counters remembered from the last successful collection of a container
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousSample {
    pub cpu_usage: u64,
    pub system_usage: u64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<&RawCounterSample> for PreviousSample {
    fn from(sample: &RawCounterSample) -> Self {
        let (net_rx, net_tx) = sample.network_totals();
        let (block_read, block_write) = sample.block_totals();
        Self {
            cpu_usage: sample.cpu_total_usage,
            system_usage: sample.system_cpu_usage,
            net_rx,
            net_tx,
            block_read,
            block_write,
            timestamp: sample.timestamp,
        }
    }
}

/// Point-in-time metrics for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub container_id: String,
    pub container_name: String,

    pub cpu_percent: f64,
    pub cpu_count: u32,

    pub memory_used: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub memory_cache: u64,

    /// Total bytes received across all interfaces
    pub network_rx: u64,
    pub network_tx: u64,
    /// bytes/sec
    pub network_rx_rate: f64,
    pub network_tx_rate: f64,

    pub block_read: u64,
    pub block_write: u64,
    pub block_read_rate: f64,
    pub block_write_rate: f64,

    pub pids: u64,
    pub state: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

/// Derive metrics from a raw sample and the previous one for the same container
pub fn derive_metrics(
    identity: &ContainerIdentity,
    sample: &RawCounterSample,
    previous: Option<&PreviousSample>,
) -> ContainerMetrics {
    let cpu_count = sample.cpu_count();
    let (network_rx, network_tx) = sample.network_totals();
    let (block_read, block_write) = sample.block_totals();

    let memory_used = sample.memory_usage.saturating_sub(sample.memory_cache);
    let memory_percent = if sample.memory_limit > 0 {
        memory_used as f64 / sample.memory_limit as f64 * 100.0
    } else {
        0.0
    };

    let mut metrics = ContainerMetrics {
        container_id: identity.id.clone(),
        container_name: identity.name.clone(),
        cpu_percent: 0.0,
        cpu_count,
        memory_used,
        memory_limit: sample.memory_limit,
        memory_percent,
        memory_cache: sample.memory_cache,
        network_rx,
        network_tx,
        network_rx_rate: 0.0,
        network_tx_rate: 0.0,
        block_read,
        block_write,
        block_read_rate: 0.0,
        block_write_rate: 0.0,
        pids: sample.pids,
        state: identity.state,
        timestamp: sample.timestamp,
    };

    let Some(prev) = previous else {
        return metrics;
    };

    metrics.cpu_percent = cpu_percent(
        sample.cpu_total_usage,
        prev.cpu_usage,
        sample.system_cpu_usage,
        prev.system_usage,
        cpu_count,
    );

    let elapsed = (sample.timestamp - prev.timestamp)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(0.0);
    metrics.network_rx_rate = rate(network_rx, prev.net_rx, elapsed);
    metrics.network_tx_rate = rate(network_tx, prev.net_tx, elapsed);
    metrics.block_read_rate = rate(block_read, prev.block_read, elapsed);
    metrics.block_write_rate = rate(block_write, prev.block_write, elapsed);

    metrics
}

fn cpu_percent(cur_cpu: u64, prev_cpu: u64, cur_system: u64, prev_system: u64, cpus: u32) -> f64 {
    let (Some(cpu_delta), Some(system_delta)) = (
        cur_cpu.checked_sub(prev_cpu),
        cur_system.checked_sub(prev_system),
    ) else {
        return 0.0;
    };
    if cpu_delta == 0 || system_delta == 0 || cpus == 0 {
        return 0.0;
    }
    (cpu_delta as f64 / system_delta as f64) * cpus as f64 * 100.0
}

fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (current as f64 - previous as f64) / elapsed_secs
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn identity(id: &str) -> ContainerIdentity {
        ContainerIdentity {
            id: id.to_string(),
            name: format!("{}-name", id),
            state: LifecycleState::Running,
        }
    }

    pub fn sample(id: &str, cpu: u64, system: u64, cpus: u32, secs: i64) -> RawCounterSample {
        RawCounterSample {
            container_id: id.to_string(),
            cpu_total_usage: cpu,
            system_cpu_usage: system,
            online_cpus: Some(cpus),
            per_cpu_entries: 0,
            memory_usage: 600 * 1024 * 1024,
            memory_cache: 88 * 1024 * 1024,
            memory_limit: 1024 * 1024 * 1024,
            networks: vec![
                InterfaceCounters { name: "eth0".into(), rx_bytes: 1000, tx_bytes: 2000 },
                InterfaceCounters { name: "eth1".into(), rx_bytes: 500, tx_bytes: 0 },
            ],
            block_io: vec![
                BlockIoEntry { major: 8, minor: 0, op: "Read".into(), value: 4096 },
                BlockIoEntry { major: 8, minor: 0, op: "write".into(), value: 8192 },
                BlockIoEntry { major: 8, minor: 0, op: "Total".into(), value: 12288 },
            ],
            pids: 7,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{identity, sample};
    use super::*;

    #[test]
    fn test_first_sample_has_zero_cpu_and_rates() {
        let raw = sample("c1", 1000, 10_000, 4, 0);
        let m = derive_metrics(&identity("c1"), &raw, None);

        assert_eq!(m.cpu_percent, 0.0);
        assert_eq!(m.network_rx_rate, 0.0);
        assert_eq!(m.network_tx_rate, 0.0);
        assert_eq!(m.block_read_rate, 0.0);
        assert_eq!(m.block_write_rate, 0.0);
        // totals still come from the raw counters
        assert_eq!(m.network_rx, 1500);
        assert_eq!(m.network_tx, 2000);
        assert_eq!(m.block_read, 4096);
        assert_eq!(m.block_write, 8192);
        assert_eq!(m.pids, 7);
    }

    #[test]
    fn test_cpu_percent_scenario() {
        let first = sample("c", 1000, 10_000, 4, 0);
        let second = sample("c", 1500, 11_000, 4, 1);
        let prev = PreviousSample::from(&first);

        let m = derive_metrics(&identity("c"), &second, Some(&prev));
        assert_eq!(m.cpu_percent, 200.0);
        assert_eq!(m.cpu_count, 4);
    }

    #[test]
    fn test_zero_system_delta_yields_zero() {
        let first = sample("c", 1000, 10_000, 4, 0);
        let second = sample("c", 1500, 10_000, 4, 1);
        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));

        assert_eq!(m.cpu_percent, 0.0);
        assert!(m.cpu_percent.is_finite());
    }

    #[test]
    fn test_counter_reset_yields_zero_cpu() {
        let first = sample("c", 5000, 10_000, 4, 0);
        let second = sample("c", 100, 11_000, 4, 1);
        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));
        assert_eq!(m.cpu_percent, 0.0);
    }

    #[test]
    fn test_online_cpus_fallback_to_per_core_entries() {
        let first = sample("c", 1000, 10_000, 0, 0);
        let mut second = sample("c", 1500, 11_000, 0, 1);
        second.online_cpus = None;
        second.per_cpu_entries = 2;

        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));
        assert_eq!(m.cpu_percent, 100.0);
        assert_eq!(m.cpu_count, 2);
    }

    #[test]
    fn test_zero_cpu_count_reports_zero() {
        let first = sample("c", 1000, 10_000, 0, 0);
        let second = sample("c", 1500, 11_000, 0, 1);
        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));
        assert_eq!(m.cpu_percent, 0.0);
    }

    #[test]
    fn test_memory_excludes_cache() {
        let raw = sample("c", 0, 0, 1, 0);
        let m = derive_metrics(&identity("c"), &raw, None);
        assert_eq!(m.memory_used, 512 * 1024 * 1024);
        assert_eq!(m.memory_percent, 50.0);

        let mut unlimited = raw.clone();
        unlimited.memory_limit = 0;
        let m = derive_metrics(&identity("c"), &unlimited, None);
        assert_eq!(m.memory_percent, 0.0);
    }

    #[test]
    fn test_rates_use_sample_timestamps() {
        let first = sample("c", 0, 0, 1, 0);
        let mut second = sample("c", 0, 0, 1, 2);
        second.networks[0].rx_bytes += 2000;
        second.block_io[1].value += 1024;

        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));
        assert_eq!(m.network_rx_rate, 1000.0);
        assert_eq!(m.network_tx_rate, 0.0);
        assert_eq!(m.block_write_rate, 512.0);
    }

    #[test]
    fn test_non_positive_elapsed_gives_zero_rates() {
        let first = sample("c", 0, 0, 1, 5);
        let mut second = sample("c", 0, 0, 1, 5);
        second.networks[0].rx_bytes += 2000;

        let m = derive_metrics(&identity("c"), &second, Some(&PreviousSample::from(&first)));
        assert_eq!(m.network_rx_rate, 0.0);
    }
}
