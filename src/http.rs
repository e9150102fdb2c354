//! Pieces shared by both HTTP services: the error type every handler
//! returns, the identity and health routes, and the serve loop.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use crate::logs::store::StoreError;
use crate::orchestration::runtime::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RuntimeUnavailable(String),
    #[error("{0}")]
    Persistence(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::RuntimeUnavailable(_) => "runtime_unavailable",
            Self::Persistence(_) => "persistence_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(_) => Self::NotFound(err.to_string()),
            RuntimeError::Unavailable(_) | RuntimeError::Timeout(_) => {
                Self::RuntimeUnavailable(err.to_string())
            }
        }
    }
}

/// `GET /` and `GET /health`, merged into every service router.
pub fn identity_routes(name: &'static str) -> Router {
    Router::new()
        .route(
            "/",
            get(move || async move {
                Json(json!({
                    "message": format!("{name} working!"),
                    "status": "OK",
                }))
            }),
        )
        .route("/health", get(|| async { Json(json!({ "status": "UP" })) }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("Received stop signal, shutting down");
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
}

/// Serve `app` on `addr` until SIGINT or SIGTERM.
pub async fn serve(name: &str, app: Router, addr: SocketAddr) -> std::io::Result<()> {
    let app = app.layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("{name} running on {}", listener.local_addr()?);

    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
