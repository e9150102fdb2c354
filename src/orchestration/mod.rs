//! Service lifecycle control: enable, disable and inspect managed services
//! through a container runtime.

pub mod controller;
pub mod docker;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use controller::ServiceController;
use docker::DockerRuntime;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run(config: &OrchestratorConfig) -> Result<(), OrchestratorError> {
    let docker = docker::connect(config.runtime_endpoint.as_deref())?;
    let runtime = Arc::new(DockerRuntime::new(docker, config.stop_timeout_secs));

    for service in &config.services {
        log::info!(
            "Managing {} as /orchestration/{} (container {})",
            service.name,
            service.route,
            service.container
        );
    }

    let controller = Arc::new(ServiceController::new(
        runtime,
        config.services.clone(),
        config.runtime_timeout(),
    ));
    crate::http::serve(routes::SERVICE_NAME, routes::router(controller), config.bind).await?;
    Ok(())
}
