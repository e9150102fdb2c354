use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An audit record as persisted by an [`EventStore`](super::store::EventStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub document_number: Option<String>,
    pub service: String,
    pub details: Option<serde_json::Value>,
    pub received_at: DateTime<Utc>,
}

/// A validated event waiting for the store to assign `id` and `receivedAt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(action: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            document_number: None,
            service: service.into(),
            details: None,
        }
    }

    pub fn with_document_number(mut self, document_number: impl Into<String>) -> Self {
        self.document_number = Some(document_number.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn into_stored(self, id: u64, received_at: DateTime<Utc>) -> LogEvent {
        LogEvent {
            id,
            timestamp: self.timestamp,
            action: self.action,
            document_number: self.document_number,
            service: self.service,
            details: self.details,
            received_at,
        }
    }
}

/// Conjunction of optional predicates used by list queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    /// Case-insensitive substring of `action`.
    pub action: Option<String>,
    pub document_number: Option<String>,
    /// Calendar day of `timestamp`, in UTC.
    pub date: Option<NaiveDate>,
}

impl ListFilter {
    pub fn matches(&self, event: &LogEvent) -> bool {
        if let Some(action) = &self.action {
            if !event
                .action
                .to_lowercase()
                .contains(&action.to_lowercase())
            {
                return false;
            }
        }
        if let Some(document_number) = &self.document_number {
            if event.document_number.as_ref() != Some(document_number) {
                return false;
            }
        }
        if let Some(date) = &self.date {
            if event.timestamp.date_naive() != *date {
                return false;
            }
        }
        true
    }
}

/// Exact-match criteria for filtered deletion. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilter {
    pub action: Option<String>,
    pub document_number: Option<String>,
    pub service: Option<String>,
}

impl DeleteFilter {
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.document_number.is_none() && self.service.is_none()
    }

    /// An empty filter matches nothing.
    pub fn matches(&self, event: &LogEvent) -> bool {
        if self.is_empty() {
            return false;
        }
        self.action.as_ref().is_none_or(|a| *a == event.action)
            && self
                .document_number
                .as_ref()
                .is_none_or(|d| event.document_number.as_ref() == Some(d))
            && self.service.as_ref().is_none_or(|s| *s == event.service)
    }
}
