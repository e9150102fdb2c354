//! PostgreSQL implementation of [`EventStore`].
//!
//! Events live in a single append-only table. `BIGSERIAL` gives the
//! monotonically increasing identifier and `received_at` defaults to the
//! database clock, so neither can be supplied by a caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use super::event::{DeleteFilter, ListFilter, LogEvent, NewEvent};
use super::store::{EventStore, StoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    action TEXT NOT NULL,
    document_number TEXT,
    service TEXT NOT NULL,
    details JSONB,
    received_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const COLUMNS: &str = "id, timestamp, action, document_number, service, details, received_at";

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        log::info!("Connected to Postgres event store");
        Ok(Self { pool })
    }
}

fn row_to_event(row: &PgRow) -> Result<LogEvent, StoreError> {
    let id: i64 = row.try_get("id")?;
    let id = u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))?;
    Ok(LogEvent {
        id,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        action: row.try_get("action")?,
        document_number: row.try_get("document_number")?,
        service: row.try_get("service")?,
        details: row.try_get("details")?,
        received_at: row.try_get::<DateTime<Utc>, _>("received_at")?,
    })
}

fn list_query(filter: &ListFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {COLUMNS} FROM audit_events WHERE TRUE"));
    if let Some(action) = &filter.action {
        query
            .push(" AND strpos(lower(action), lower(")
            .push_bind(action.clone())
            .push(")) > 0");
    }
    if let Some(document_number) = &filter.document_number {
        query
            .push(" AND document_number = ")
            .push_bind(document_number.clone());
    }
    if let Some(date) = filter.date {
        query
            .push(" AND (timestamp AT TIME ZONE 'UTC')::date = ")
            .push_bind(date);
    }
    query.push(" ORDER BY id");
    query
}

/// `None` when the filter has no criteria.
fn delete_query(filter: &DeleteFilter) -> Option<QueryBuilder<'static, Postgres>> {
    if filter.is_empty() {
        return None;
    }
    let mut query = QueryBuilder::new("DELETE FROM audit_events WHERE TRUE");
    if let Some(action) = &filter.action {
        query.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(document_number) = &filter.document_number {
        query
            .push(" AND document_number = ")
            .push_bind(document_number.clone());
    }
    if let Some(service) = &filter.service {
        query.push(" AND service = ").push_bind(service.clone());
    }
    Some(query)
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, event: NewEvent) -> Result<LogEvent, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO audit_events (timestamp, action, document_number, service, details) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(event.timestamp)
        .bind(&event.action)
        .bind(&event.document_number)
        .bind(&event.service)
        .bind(&event.details)
        .fetch_one(&self.pool)
        .await?;
        row_to_event(&row)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<LogEvent>, StoreError> {
        let mut query = list_query(filter);
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get(&self, id: u64) -> Result<Option<LogEvent>, StoreError> {
        // Anything above i64::MAX was never assigned.
        let Ok(id) = i64::try_from(id) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM audit_events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM audit_events")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_matching(&self, filter: &DeleteFilter) -> Result<u64, StoreError> {
        let Some(mut query) = delete_query(filter) else {
            return Ok(0);
        };
        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_list_query_without_filters() {
        let query = list_query(&ListFilter::default());
        assert_eq!(
            query.sql(),
            format!("SELECT {COLUMNS} FROM audit_events WHERE TRUE ORDER BY id")
        );
    }

    #[test]
    fn test_list_query_binds_every_filter() {
        let filter = ListFilter {
            action: Some("deleted".to_string()),
            document_number: Some("123456789".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 1, 31),
        };
        let query = list_query(&filter);
        let sql = query.sql();
        assert!(sql.contains("strpos(lower(action), lower($1)) > 0"));
        assert!(sql.contains("document_number = $2"));
        assert!(sql.contains("::date = $3"));
        assert!(sql.ends_with("ORDER BY id"));
    }

    #[test]
    fn test_delete_query_requires_criteria() {
        assert!(delete_query(&DeleteFilter::default()).is_none());

        let filter = DeleteFilter {
            service: Some("delete-service".to_string()),
            ..Default::default()
        };
        let query = delete_query(&filter).expect("query");
        assert_eq!(
            query.sql(),
            "DELETE FROM audit_events WHERE TRUE AND service = $1"
        );
    }
}
