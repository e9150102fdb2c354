use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Workload {0} does not exist")]
    NotFound(String),
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Container runtime did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    Unknown,
}

impl AsRef<str> for ServiceState {
    fn as_ref(&self) -> &str {
        match self {
            Self::Running => "enabled",
            Self::Stopped => "disabled",
            Self::Unknown => "unknown",
        }
    }
}

/// What the runtime reports about a workload at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub state: ServiceState,
    /// Only set while running.
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkloadStatus {
    pub fn running(started_at: Option<DateTime<Utc>>) -> Self {
        Self {
            state: ServiceState::Running,
            started_at,
        }
    }

    pub fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            started_at: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            state: ServiceState::Unknown,
            started_at: None,
        }
    }
}

/// Starts, stops and inspects workloads by name, independent of whether
/// they are containers, processes or something else.
#[async_trait]
pub trait WorkloadController: Send + Sync {
    /// Starting a workload that is already running is not an error.
    async fn start(&self, name: &str) -> Result<(), RuntimeError>;

    /// Stopping a workload that is already stopped is not an error.
    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    async fn inspect(&self, name: &str) -> Result<WorkloadStatus, RuntimeError>;
}
