//! In-memory collaborator doubles for pipeline tests.
//!
//! Each double records the calls it receives and supports failure injection
//! so commit-protocol tests can exercise the exact failure orderings the
//! pipeline guarantees.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingate_core::{
    error::{CoreError, Result},
    models::{AuthCandidate, CommitRecord, EventId, InsertOutcome, PrincipalId, StoredEvent},
};

use crate::{
    broker::EventBroker,
    credential::PrincipalDirectory,
    rate_limit::{CounterStore, WindowCount},
    store::EventStore,
};

/// In-memory principal directory.
#[derive(Default)]
pub struct MockDirectory {
    candidates: Vec<AuthCandidate>,
    requested_previews: Mutex<Vec<String>>,
    touched: Mutex<Vec<PrincipalId>>,
    fail_touches: Mutex<bool>,
    fail_lookups: Mutex<bool>,
}

impl MockDirectory {
    /// Creates a directory holding the given credential candidates.
    pub fn with_candidates(candidates: Vec<AuthCandidate>) -> Self {
        Self { candidates, ..Self::default() }
    }

    /// Previews requested so far, in call order.
    pub fn requested_previews(&self) -> Vec<String> {
        self.requested_previews.lock().unwrap().clone()
    }

    /// Principals whose `last_used_at` was touched.
    pub fn touched(&self) -> Vec<PrincipalId> {
        self.touched.lock().unwrap().clone()
    }

    /// Makes subsequent `touch_last_used` calls fail.
    pub fn fail_touches(&self) {
        *self.fail_touches.lock().unwrap() = true;
    }

    /// Makes subsequent lookups fail.
    pub fn fail_lookups(&self) {
        *self.fail_lookups.lock().unwrap() = true;
    }
}

#[async_trait]
impl PrincipalDirectory for MockDirectory {
    async fn find_active_by_preview(&self, preview: &str) -> Result<Vec<AuthCandidate>> {
        if *self.fail_lookups.lock().unwrap() {
            return Err(CoreError::Database("injected lookup failure".to_string()));
        }
        self.requested_previews.lock().unwrap().push(preview.to_string());
        // No preview column here: every active candidate is returned and the
        // resolver's digest verification narrows the set. Tests asserting on
        // preview narrowing inspect `requested_previews`.
        Ok(self.candidates.iter().filter(|c| c.principal.active).cloned().collect())
    }

    async fn touch_last_used(&self, id: PrincipalId) -> Result<()> {
        if *self.fail_touches.lock().unwrap() {
            return Err(CoreError::Database("injected touch failure".to_string()));
        }
        self.touched.lock().unwrap().push(id);
        Ok(())
    }
}

/// Counter store that always fails, for fail-open tests.
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn increment(&self, _key: &str, _window: Duration) -> Result<WindowCount> {
        Err(CoreError::BackendUnavailable("injected counter failure".to_string()))
    }
}

/// In-memory event store keyed by event id.
#[derive(Default)]
pub struct MockEventStore {
    rows: Mutex<HashMap<EventId, CommitRecord>>,
    fail_inserts: Mutex<bool>,
}

impl MockEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent inserts fail.
    pub fn fail_inserts(&self) {
        *self.fail_inserts.lock().unwrap() = true;
    }

    /// Number of rows currently stored.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Returns the stored record for an event id, if any.
    pub fn row(&self, id: EventId) -> Option<CommitRecord> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn insert(&self, record: &CommitRecord) -> Result<InsertOutcome> {
        if *self.fail_inserts.lock().unwrap() {
            return Err(CoreError::Database("injected insert failure".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&record.event_id) {
            Ok(InsertOutcome::AlreadyApplied)
        } else {
            rows.insert(record.event_id, record.clone());
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<StoredEvent>> {
        Ok(self.rows.lock().unwrap().get(&id).map(stored))
    }

    async fn find_by_principal(
        &self,
        principal_id: PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>> {
        let mut events: Vec<StoredEvent> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.principal_id == principal_id && r.received_at >= from && r.received_at <= to
            })
            .map(stored)
            .collect();
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(events)
    }
}

fn stored(record: &CommitRecord) -> StoredEvent {
    StoredEvent {
        id: record.event_id,
        principal_id: record.principal_id,
        subject_id: record.subject_id.clone(),
        event_type: record.event_type,
        payload: sqlx::types::Json(record.payload.clone()),
        signature: record.signature.clone(),
        received_at: record.received_at,
    }
}

/// In-memory broker recording every publish.
#[derive(Default)]
pub struct MockBroker {
    publishes: Mutex<Vec<(String, String, CommitRecord)>>,
    fail_publishes: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl MockBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail.
    pub fn fail_publishes(&self) {
        *self.fail_publishes.lock().unwrap() = true;
    }

    /// Makes subsequent publishes sleep before recording, for tests that
    /// race a publish against request cancellation.
    pub fn delay_publishes(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Every `(channel, key, record)` published so far, in order.
    pub fn publishes(&self) -> Vec<(String, String, CommitRecord)> {
        self.publishes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBroker for MockBroker {
    async fn publish(&self, channel: &str, key: &str, record: &CommitRecord) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_publishes.lock().unwrap() {
            return Err(CoreError::BackendUnavailable("injected publish failure".to_string()));
        }
        self.publishes.lock().unwrap().push((
            channel.to_string(),
            key.to_string(),
            record.clone(),
        ));
        Ok(())
    }
}
