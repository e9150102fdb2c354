use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::get,
};
use log::debug;
use serde_json::{Value, json};

use super::service::{DeleteRequest, IngestRequest, ListQuery, LogService};
use crate::http::{ApiError, identity_routes};

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "Logs Service";

pub fn router(service: LogService) -> Router {
    Router::new()
        .route("/logs", get(list_logs).post(ingest_log).delete(clear_logs))
        .route(
            "/logs/filter",
            get(filter_is_not_a_log).delete(clear_logs_by_filter),
        )
        .route("/logs/{id}", get(get_log))
        .with_state(service)
        .merge(identity_routes(SERVICE_NAME))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

async fn ingest_log(
    State(service): State<LogService>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let log = service.ingest(body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Log registered successfully",
            "log": log,
        })),
    ))
}

async fn list_logs(
    State(service): State<LogService>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let filter = query.into_filter()?;
    debug!("Listing logs with {filter:?}");
    let data = service.list(&filter).await?;
    Ok(Json(json!({
        "message": "Logs retrieved successfully",
        "count": data.len(),
        "data": data,
        "filters": filter,
    })))
}

async fn get_log(
    State(service): State<LogService>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let log = service.get(&id).await?;
    Ok(Json(json!({
        "message": "Log found successfully",
        "data": log,
    })))
}

// "filter" is never a valid id, so a GET here is a missing log.
async fn filter_is_not_a_log() -> ApiError {
    ApiError::NotFound("Log filter not found".to_string())
}

async fn clear_logs(State(service): State<LogService>) -> Result<Json<Value>, ApiError> {
    let deleted = service.delete_all().await?;
    Ok(Json(json!({
        "message": "All logs cleared successfully",
        "logsDeleted": deleted,
    })))
}

async fn clear_logs_by_filter(
    State(service): State<LogService>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let filter = body(payload)?.into_filter()?;
    let deleted = service.delete_by_filter(&filter).await?;
    Ok(Json(json!({
        "message": "Logs cleared by filter successfully",
        "logsDeleted": deleted,
        "filtersApplied": filter,
    })))
}
