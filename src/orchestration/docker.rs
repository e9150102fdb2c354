//! Docker implementation of [`WorkloadController`] using bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, StartContainerOptions,
    StartContainerOptionsBuilder, StopContainerOptions, StopContainerOptionsBuilder,
};
use chrono::{DateTime, Utc};

use super::runtime::{RuntimeError, WorkloadController, WorkloadStatus};

/// Seconds bollard waits on the daemon before giving up on a request.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Connect to the Docker daemon.
///
/// `None` uses the local defaults (Unix socket on Linux/macOS, named pipe on
/// Windows). `unix://` endpoints connect to that socket and `tcp://` or
/// `http://` endpoints connect over plain HTTP.
pub fn connect(endpoint: Option<&str>) -> Result<Docker, bollard::errors::Error> {
    match endpoint {
        None => Docker::connect_with_local_defaults(),
        #[cfg(unix)]
        Some(endpoint) if endpoint.starts_with("unix://") => Docker::connect_with_socket(
            endpoint,
            CLIENT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        ),
        Some(endpoint) => Docker::connect_with_http(
            endpoint,
            CLIENT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        ),
    }
}

fn map_error(name: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(name.to_string()),
        e => RuntimeError::Unavailable(e.to_string()),
    }
}

/// Docker reports `0001-01-01T00:00:00Z` for containers that never started.
fn parse_started_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let started_at = raw?.parse::<DateTime<Utc>>().ok()?;
    (started_at.timestamp() > 0).then_some(started_at)
}

pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_secs: i32,
}

impl DockerRuntime {
    pub fn new(docker: Docker, stop_timeout_secs: i32) -> Self {
        Self {
            docker,
            stop_timeout_secs,
        }
    }
}

#[async_trait]
impl WorkloadController for DockerRuntime {
    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let options: StartContainerOptions = StartContainerOptionsBuilder::new().build();

        match self.docker.start_container(name, Some(options)).await {
            Ok(_) => {
                log::info!("Container {name} started successfully");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                log::info!("Container {name} already started");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start container {name}: {e}");
                Err(map_error(name, e))
            }
        }
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let options: StopContainerOptions = StopContainerOptionsBuilder::new()
            .t(self.stop_timeout_secs)
            .build();

        match self.docker.stop_container(name, Some(options)).await {
            Ok(_) => {
                log::info!("Container {name} stopped successfully");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                log::info!("Container {name} already stopped");
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to stop container {name}: {e}");
                Err(map_error(name, e))
            }
        }
    }

    async fn inspect(&self, name: &str) -> Result<WorkloadStatus, RuntimeError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();

        let info = self
            .docker
            .inspect_container(name, Some(options))
            .await
            .map_err(|e| map_error(name, e))?;

        let Some(state) = info.state else {
            return Ok(WorkloadStatus::unknown());
        };
        Ok(match state.running {
            Some(true) => WorkloadStatus::running(parse_started_at(state.started_at.as_deref())),
            Some(false) => WorkloadStatus::stopped(),
            None => WorkloadStatus::unknown(),
        })
    }
}
