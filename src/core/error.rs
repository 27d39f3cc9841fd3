/// Error taxonomy shared by the collector, the runtime adapter and the hub

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Container vanished or was never known to the runtime
    #[error("container not found: {0}")]
    NotFound(String),

    /// Runtime daemon unreachable, timed out, or returned an unusable answer
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Subscriber queue is at capacity
    #[error("subscriber {0} queue is full")]
    QueueFull(u64),

    /// Subscriber transport is gone
    #[error("subscriber {0} disconnected")]
    Disconnected(u64),

    /// Registry owner task has stopped
    #[error("distribution hub is shut down")]
    HubClosed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MonitorError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for MonitorError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, message } => {
                MonitorError::NotFound(message)
            }
            other => MonitorError::RuntimeUnavailable(other.to_string()),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
