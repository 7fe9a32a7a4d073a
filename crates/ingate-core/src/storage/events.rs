//! Repository for committed gateway events.
//!
//! The write path is insert-or-ignore keyed by the server-assigned event id:
//! a retried commit with the same id leaves exactly one row in place, which
//! is what makes the persist-then-publish protocol safe to retry from the
//! caller's side.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CommitRecord, EventId, InsertOutcome, PrincipalId, StoredEvent},
};

/// Repository for gateway event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Persists a commit record, ignoring duplicates by event id.
    ///
    /// Returns `InsertOutcome::AlreadyApplied` when a row with this id
    /// already exists; the conflict is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails for any reason other than an id
    /// conflict.
    pub async fn insert(&self, record: &CommitRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r"
            INSERT INTO gateway_events (
                id, principal_id, subject_id, event_type,
                payload, signature, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(record.event_id)
        .bind(record.principal_id)
        .bind(&record.subject_id)
        .bind(record.event_type)
        .bind(sqlx::types::Json(&record.payload))
        .bind(&record.signature)
        .bind(record.received_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyApplied)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Finds a committed event by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<StoredEvent>> {
        let event = sqlx::query_as::<_, StoredEvent>(
            r"
            SELECT id, principal_id, subject_id, event_type,
                   payload, signature, received_at
            FROM gateway_events
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Finds committed events for a principal within a time range.
    ///
    /// Results are ordered newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_principal(
        &self,
        principal_id: PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r"
            SELECT id, principal_id, subject_id, event_type,
                   payload, signature, received_at
            FROM gateway_events
            WHERE principal_id = $1
              AND received_at >= $2
              AND received_at <= $3
            ORDER BY received_at DESC
            ",
        )
        .bind(principal_id)
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }

    /// Counts committed events for a principal.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_principal(&self, principal_id: PrincipalId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM gateway_events WHERE principal_id = $1")
                .bind(principal_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }
}
