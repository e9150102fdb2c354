use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::event::{DeleteFilter, ListFilter, LogEvent, NewEvent};
use super::store::{EventStore, StoreError};
use crate::http::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub timestamp: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub document_number: Option<String>,
    pub service: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub action: Option<String>,
    pub document_number: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub action: Option<String>,
    pub document_number: Option<String>,
    pub service: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    non_empty(value).ok_or_else(|| ApiError::Validation(format!("{field} is required")))
}

impl IngestRequest {
    pub fn into_new_event(self) -> Result<NewEvent, ApiError> {
        Ok(NewEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            action: required(self.action, "action")?,
            document_number: self.document_number,
            service: required(self.service, "service")?,
            details: self.details,
        })
    }
}

impl ListQuery {
    pub fn into_filter(self) -> Result<ListFilter, ApiError> {
        let date = non_empty(self.date)
            .map(|d| {
                NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").map_err(|_| {
                    ApiError::Validation(format!("date {d:?} is not a YYYY-MM-DD day"))
                })
            })
            .transpose()?;
        Ok(ListFilter {
            action: non_empty(self.action),
            document_number: non_empty(self.document_number),
            date,
        })
    }
}

impl DeleteRequest {
    pub fn into_filter(self) -> Result<DeleteFilter, ApiError> {
        let filter = DeleteFilter {
            action: non_empty(self.action),
            document_number: non_empty(self.document_number),
            service: non_empty(self.service),
        };
        if filter.is_empty() {
            return Err(ApiError::Validation(
                "at least one of action, documentNumber or service is required".to_string(),
            ));
        }
        Ok(filter)
    }
}

/// Validation and timeouts in front of an [`EventStore`].
#[derive(Clone)]
pub struct LogService {
    store: Arc<dyn EventStore>,
    timeout: Duration,
}

impl LogService {
    pub fn new(store: Arc<dyn EventStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ApiError> {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };
        result.map_err(|e| {
            log::error!("Event store failed to {operation}: {e}");
            e.into()
        })
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<LogEvent, ApiError> {
        let event = request.into_new_event()?;
        let stored = self.bounded("append", self.store.append(event)).await?;
        log::info!(
            "New log registered: id={} action={} service={}",
            stored.id,
            stored.action,
            stored.service
        );
        Ok(stored)
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<LogEvent>, ApiError> {
        self.bounded("list", self.store.list(filter)).await
    }

    /// Identifiers that are not numbers cannot exist, so they are not found
    /// rather than invalid.
    pub async fn get(&self, id: &str) -> Result<LogEvent, ApiError> {
        let not_found = || ApiError::NotFound(format!("Log {id} not found"));
        let numeric: u64 = id.parse().map_err(|_| not_found())?;
        self.bounded("get", self.store.get(numeric))
            .await?
            .ok_or_else(not_found)
    }

    pub async fn delete_all(&self) -> Result<u64, ApiError> {
        let removed = self.bounded("delete", self.store.delete_all()).await?;
        log::info!("All logs cleared ({removed} removed)");
        Ok(removed)
    }

    pub async fn delete_by_filter(&self, filter: &DeleteFilter) -> Result<u64, ApiError> {
        if filter.is_empty() {
            return Err(ApiError::Validation(
                "refusing to delete without a filter".to_string(),
            ));
        }
        let removed = self
            .bounded("delete", self.store.delete_matching(filter))
            .await?;
        log::info!("Logs cleared by filter {filter:?} ({removed} removed)");
        Ok(removed)
    }
}
