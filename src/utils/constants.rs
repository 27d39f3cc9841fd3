/// Constants and shared enums for cm-monitor

use serde::{Deserialize, Serialize};

/// Default dashboard refresh cadence
pub const DEFAULT_REFRESH_SECS: u64 = 2;

/// Default timeout for one-shot runtime calls (inspect, stats, list)
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 10;

/// Default outbound queue depth per subscriber
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Keepalive ping period for WebSocket subscribers
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Read deadline after which a silent subscriber is dropped
pub const DEFAULT_READ_DEADLINE_SECS: u64 = 60;

/// Largest inbound client frame accepted
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 512;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8787;

pub const DEFAULT_PROFILE_DURATION_SECS: u64 = 30;
pub const DEFAULT_PROFILE_INTERVAL_SECS: u64 = 1;

/// Owner identity used when a connection carries no recognised token
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Lines of history sent when a subscriber starts following logs
pub const LOG_FOLLOW_TAIL: usize = 50;

/// Runtime events kept for the dashboard's events panel
pub const RECENT_EVENTS: usize = 10;

/// Log lines kept while the dashboard follows a container
pub const LOG_VIEW_LINES: usize = 200;

/// Container lifecycle state as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Running,
    Paused,
    Restarting,
    Created,
    Stopped,
    Dead,
    #[default]
    Unknown,
}

impl From<&str> for LifecycleState {
    fn from(status: &str) -> Self {
        let status_lower = status.to_lowercase();
        if status_lower.contains("up") || status_lower.contains("running") {
            LifecycleState::Running
        } else if status_lower.contains("paused") {
            LifecycleState::Paused
        } else if status_lower.contains("restarting") {
            LifecycleState::Restarting
        } else if status_lower.contains("dead") || status_lower.contains("removing") {
            LifecycleState::Dead
        } else if status_lower.contains("exited") || status_lower.contains("stopped") {
            LifecycleState::Stopped
        } else if status_lower.contains("created") {
            LifecycleState::Created
        } else {
            LifecycleState::Unknown
        }
    }
}

impl LifecycleState {
    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::Restarting => "restarting",
            LifecycleState::Created => "created",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Dead => "dead",
            LifecycleState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state() {
        assert_eq!(LifecycleState::from("Up 2 hours"), LifecycleState::Running);
        assert_eq!(LifecycleState::from("running"), LifecycleState::Running);
        assert_eq!(LifecycleState::from("Exited (0)"), LifecycleState::Stopped);
        assert_eq!(LifecycleState::from("created"), LifecycleState::Created);
        assert_eq!(LifecycleState::from("???"), LifecycleState::Unknown);
        assert!(LifecycleState::Running.is_running());
        assert!(!LifecycleState::Paused.is_running());
    }

    #[test]
    fn test_lifecycle_state_serializes_lowercase() {
        let json = serde_json::to_string(&LifecycleState::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
    }
}
