//! Storage contracts for the pipeline and their PostgreSQL adapters.
//!
//! The pipeline depends on narrow traits so commit-protocol tests can run
//! against in-memory doubles; production wires these adapters over the
//! repositories in `ingate-core`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingate_core::{
    error::Result,
    models::{AuthCandidate, CommitRecord, EventId, InsertOutcome, PrincipalId, StoredEvent},
    Storage,
};

use crate::credential::PrincipalDirectory;

/// Durable persistence contract for committed events.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Persists a commit record, ignoring duplicates by event id.
    async fn insert(&self, record: &CommitRecord) -> Result<InsertOutcome>;

    /// Finds a committed event by id.
    async fn find_by_id(&self, id: EventId) -> Result<Option<StoredEvent>>;

    /// Finds committed events for a principal within a time range, newest
    /// first.
    async fn find_by_principal(
        &self,
        principal_id: PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>>;
}

/// PostgreSQL-backed event store over the core repositories.
pub struct PostgresEventStore {
    storage: Arc<Storage>,
}

impl PostgresEventStore {
    /// Creates an event store over shared storage.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn insert(&self, record: &CommitRecord) -> Result<InsertOutcome> {
        self.storage.events.insert(record).await
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<StoredEvent>> {
        self.storage.events.find_by_id(id).await
    }

    async fn find_by_principal(
        &self,
        principal_id: PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>> {
        self.storage.events.find_by_principal(principal_id, from, to).await
    }
}

/// PostgreSQL-backed principal directory over the core repositories.
pub struct PostgresDirectory {
    storage: Arc<Storage>,
}

impl PostgresDirectory {
    /// Creates a directory over shared storage.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PrincipalDirectory for PostgresDirectory {
    async fn find_active_by_preview(&self, preview: &str) -> Result<Vec<AuthCandidate>> {
        self.storage.principals.find_active_by_preview(preview).await
    }

    async fn touch_last_used(&self, id: PrincipalId) -> Result<()> {
        self.storage.principals.touch_last_used(id).await
    }
}
