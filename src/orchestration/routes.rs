use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde_json::{Value, json};

use super::controller::{ServiceController, ServiceStatus, Transition};
use super::runtime::ServiceState;
use crate::http::{ApiError, identity_routes};

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "Orchestration Service";

pub fn router(controller: Arc<ServiceController>) -> Router {
    Router::new()
        .route("/orchestration/status", get(default_status))
        .route("/orchestration/{route}/status", get(service_status))
        .route("/orchestration/{route}/enable", post(enable))
        .route("/orchestration/{route}/disable", post(disable))
        .with_state(controller)
        .merge(identity_routes(SERVICE_NAME))
}

fn transition_body(transition: Transition, verb: &str) -> Json<Value> {
    let message = if transition.changed {
        format!("{} {verb} successfully", transition.service)
    } else {
        format!("{} was already {verb}", transition.service)
    };
    Json(json!({
        "message": message,
        "service": transition.service,
        "status": verb,
    }))
}

fn status_body(status: ServiceStatus) -> Json<Value> {
    Json(json!({
        "service": status.service,
        "status": status.status.state.as_ref(),
        "running": status.status.state == ServiceState::Running,
        "startedAt": status.status.started_at,
    }))
}

async fn enable(
    State(controller): State<Arc<ServiceController>>,
    Path(route): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let transition = controller.enable(&route).await?;
    Ok(transition_body(transition, "enabled"))
}

async fn disable(
    State(controller): State<Arc<ServiceController>>,
    Path(route): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let transition = controller.disable(&route).await?;
    Ok(transition_body(transition, "disabled"))
}

async fn default_status(
    State(controller): State<Arc<ServiceController>>,
) -> Result<Json<Value>, ApiError> {
    Ok(status_body(controller.status(None).await?))
}

async fn service_status(
    State(controller): State<Arc<ServiceController>>,
    Path(route): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(status_body(controller.status(Some(&route)).await?))
}
