//! Audit log collection: append-only event storage with filtered queries
//! and deletion, served over HTTP.

pub mod event;
pub mod postgres;
pub mod routes;
pub mod service;
pub mod sink;
pub mod store;

use std::sync::Arc;

use crate::config::LogsConfig;
use postgres::PostgresEventStore;
use service::LogService;
use store::{EventStore, MemoryEventStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LogsError {
    #[error("Event store error: {0}")]
    Store(#[from] StoreError),
    #[error("Unsupported store url {0:?}")]
    UnsupportedStore(String),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn open_store(url: &str) -> Result<Arc<dyn EventStore>, LogsError> {
    if url.starts_with("memory://") {
        log::info!("Using in-memory event store");
        Ok(Arc::new(MemoryEventStore::new()))
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Arc::new(PostgresEventStore::connect(url).await?))
    } else {
        Err(LogsError::UnsupportedStore(url.to_string()))
    }
}

pub async fn run(config: &LogsConfig) -> Result<(), LogsError> {
    let store = open_store(&config.store_url).await?;
    let service = LogService::new(store, config.store_timeout());
    crate::http::serve(routes::SERVICE_NAME, routes::router(service), config.bind).await?;
    Ok(())
}
