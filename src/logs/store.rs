//! Event store abstraction and the in-memory implementation.
//!
//! The store owns identifier and ingestion-time assignment. Events are
//! append-only: there is no update, only deletion by predicate.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::event::{DeleteFilter, ListFilter, LogEvent, NewEvent};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Store did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist `event`, assigning `id` and `received_at`.
    async fn append(&self, event: NewEvent) -> Result<LogEvent, StoreError>;

    /// Matching events in insertion order.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<LogEvent>, StoreError>;

    async fn get(&self, id: u64) -> Result<Option<LogEvent>, StoreError>;

    /// Remove every event, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Remove the events matched by `filter`. An empty filter removes nothing.
    async fn delete_matching(&self, filter: &DeleteFilter) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    events: Vec<LogEvent>,
    next_id: u64,
}

/// Keeps events in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<LogEvent, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = event.into_stored(inner.next_id, Utc::now());
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<LogEvent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn get(&self, id: u64) -> Result<Option<LogEvent>, StoreError> {
        let inner = self.inner.read().await;
        // ids are assigned in increasing order, so the vector stays sorted by id
        Ok(inner
            .events
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| inner.events[idx].clone()))
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.events.len() as u64;
        inner.events.clear();
        Ok(removed)
    }

    async fn delete_matching(&self, filter: &DeleteFilter) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.events.len();
        inner.events.retain(|e| !filter.matches(e));
        Ok((before - inner.events.len()) as u64)
    }
}
