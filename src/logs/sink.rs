//! Producer-side delivery of audit events.
//!
//! Producers treat event delivery as a side effect of their own work: a
//! failed send is logged and dropped, never surfaced to the producer's caller.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};

use super::event::NewEvent;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Log service rejected the event with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &NewEvent) -> Result<(), SinkError>;
}

/// Posts events to a running log service.
#[derive(Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/logs", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, event: &NewEvent) -> Result<(), SinkError> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }
        debug!("Delivered {} event to {}", event.action, self.endpoint);
        Ok(())
    }
}

/// Send `event` in the background. Failures are logged and swallowed.
pub fn emit_best_effort(sink: Arc<dyn EventSink>, event: NewEvent) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.send(&event).await {
            warn!(
                "Failed to deliver {} event from {}: {e}",
                event.action, event.service
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{
        event::ListFilter,
        routes::router,
        service::LogService,
        store::{EventStore, MemoryEventStore},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EventSink for FailingSink {
        async fn send(&self, _event: &NewEvent) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Rejected {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let sink = Arc::new(FailingSink {
            attempts: AtomicUsize::new(0),
        });
        let handle = emit_best_effort(sink.clone(), NewEvent::new("PERSON_CREATED", "create-service"));
        // The task completes normally even though delivery failed.
        handle.await.expect("emit task panicked");
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_sink_delivers_to_log_service() {
        let store = Arc::new(MemoryEventStore::new());
        let app = router(LogService::new(store.clone(), Duration::from_secs(1)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sink = HttpEventSink::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        let event = NewEvent::new("PERSON_DELETED", "delete-service")
            .with_document_number("123456789")
            .with_details(serde_json::json!({ "reason": "requested" }));
        sink.send(&event).await.unwrap();

        let stored = store.list(&ListFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].action, "PERSON_DELETED");
        assert_eq!(stored[0].document_number.as_deref(), Some("123456789"));
        assert_eq!(stored[0].timestamp, event.timestamp);
        assert_eq!(stored[0].details, event.details);

        let invalid = NewEvent::new("", "delete-service");
        assert!(matches!(
            sink.send(&invalid).await,
            Err(SinkError::Rejected { status, .. }) if status == reqwest::StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn test_http_sink_unreachable_service() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpEventSink::new(&format!("http://{addr}"), Duration::from_secs(1)).unwrap();
        let result = sink.send(&NewEvent::new("PERSON_CREATED", "create-service")).await;
        assert!(matches!(result, Err(SinkError::Http(_))));
    }
}
