//! End-to-end pipeline tests over in-memory collaborators.
//!
//! Exercises the stage ordering, the commit protocol's failure semantics,
//! and the rate-limit and signature contracts as a caller observes them.

use std::sync::Arc;

use ingate_core::{
    digest,
    models::{AuthCandidate, InsertOutcome, Principal, PrincipalId, RatePolicy},
    GatewayError,
};
use ingate_pipeline::{
    testing::{MockBroker, MockDirectory, MockEventStore},
    EventPipeline, IngestRequest, MemoryCounterStore, PipelineConfig, PipelineStage,
    SignatureVerifier, ValidationConfig,
};
use serde_json::{json, Value};
use uuid::Uuid;

const RAW_KEY: &str = "sk_live_0123456789abcdef";
const SECRET: &str = "test-signing-secret";
const CHANNEL: &str = "gateway.events";

struct Harness {
    pipeline: EventPipeline,
    directory: Arc<MockDirectory>,
    store: Arc<MockEventStore>,
    broker: Arc<MockBroker>,
    principal_id: PrincipalId,
}

fn harness_with_policy(policy: Option<RatePolicy>) -> Harness {
    let principal_id = PrincipalId::new();
    let candidate = AuthCandidate {
        principal: Principal {
            id: principal_id,
            owner_id: Uuid::new_v4(),
            label: "test-key".to_string(),
            active: true,
            rate_policy: policy,
            last_used_at: None,
        },
        key_digest: digest::compute(RAW_KEY),
    };

    let directory = Arc::new(MockDirectory::with_candidates(vec![candidate]));
    let store = Arc::new(MockEventStore::new());
    let broker = Arc::new(MockBroker::new());

    let pipeline = EventPipeline::new(
        PipelineConfig {
            channel: CHANNEL.to_string(),
            signing_secret: SECRET.to_string(),
            validation: ValidationConfig::default(),
            default_policy: RatePolicy::new(100, 60),
        },
        directory.clone(),
        Arc::new(MemoryCounterStore::new()),
        store.clone(),
        broker.clone(),
    )
    .expect("pipeline construction");

    Harness { pipeline, directory, store, broker, principal_id }
}

fn harness() -> Harness {
    harness_with_policy(None)
}

fn envelope(subject_id: &str) -> Value {
    json!({
        "event_type": "ai.query",
        "subject_id": subject_id,
        "subject_version": "1.4.2",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "metadata": {"session": "sess-42"}
    })
}

fn sign(body: &Value) -> String {
    SignatureVerifier::new(SECRET).unwrap().sign(body)
}

fn signed_request(subject_id: &str) -> IngestRequest {
    let body = envelope(subject_id);
    let signature = sign(&body);
    IngestRequest {
        credential: Some(RAW_KEY.to_string()),
        signature_header: Some(signature),
        body,
    }
}

#[tokio::test]
async fn committed_events_get_fresh_unique_ids() {
    let h = harness();

    let first = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap();
    let second = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap();

    assert_ne!(first.event_id, second.event_id);
    assert_eq!(first.outcome, InsertOutcome::Inserted);
    assert_eq!(second.outcome, InsertOutcome::Inserted);
    assert_eq!(h.store.row_count(), 2);
}

#[tokio::test]
async fn publish_is_keyed_by_subject_on_the_configured_channel() {
    let h = harness();

    h.pipeline.ingest(signed_request("subject-0001")).await.unwrap();

    let publishes = h.broker.publishes();
    assert_eq!(publishes.len(), 1);
    let (channel, key, record) = &publishes[0];
    assert_eq!(channel, CHANNEL);
    assert_eq!(key, "subject-0001");
    assert_eq!(record.principal_id, h.principal_id);
    assert_eq!(record.payload["metadata"]["normalized"], json!(true));
}

#[tokio::test]
async fn stored_payload_is_the_normalized_envelope() {
    let h = harness();

    let report = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap();

    let row = h.store.row(report.event_id).expect("row persisted");
    assert_eq!(row.payload["metadata"]["normalized"], json!(true));
    assert_eq!(row.payload["metadata"]["normalized_version"], json!("1.0"));
    assert!(row.payload["received_at"].is_string());
}

#[tokio::test]
async fn invalid_credential_stops_before_every_later_stage() {
    let h = harness();

    let mut request = signed_request("subject-0001");
    request.credential = Some("sk_live_ffffffffffffffff".to_string());

    let rejection = h.pipeline.ingest(request).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::InvalidCredential));
    assert_eq!(rejection.completed, PipelineStage::Received);
    assert!(rejection.rate.is_none());
    assert_eq!(h.store.row_count(), 0);
    assert!(h.broker.publishes().is_empty());
}

#[tokio::test]
async fn directory_outage_is_a_server_error_not_a_credential_error() {
    let h = harness();
    h.directory.fail_lookups();

    let rejection = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::Configuration(_)));
}

#[tokio::test]
async fn rate_limit_sequence_allows_then_denies() {
    let h = harness_with_policy(Some(RatePolicy::new(3, 60)));

    let mut remaining = Vec::new();
    for _ in 0..3 {
        let report = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap();
        remaining.push(report.rate.remaining);
    }
    assert_eq!(remaining, vec![2, 1, 0]);

    let rejection = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::RateLimited { .. }));
    assert_eq!(rejection.completed, PipelineStage::Authenticated);
    let rate = rejection.rate.expect("rate decision on 429");
    assert_eq!(rate.remaining, 0);
    // The denied request commits nothing.
    assert_eq!(h.store.row_count(), 3);
}

#[tokio::test]
async fn invalid_envelope_is_rejected_before_signature_check() {
    let h = harness();

    let mut request = signed_request("subject-0001");
    request.body["subject_id"] = json!("short");

    let rejection = h.pipeline.ingest(request).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::Validation { .. }));
    assert_eq!(rejection.completed, PipelineStage::RateChecked);
    assert_eq!(h.store.row_count(), 0);
}

#[tokio::test]
async fn corrupted_signature_is_rejected() {
    let h = harness();

    let mut request = signed_request("subject-0001");
    let mut sig = request.signature_header.take().unwrap().into_bytes();
    sig[0] = if sig[0] == b'0' { b'1' } else { b'0' };
    request.signature_header = Some(String::from_utf8(sig).unwrap());

    let rejection = h.pipeline.ingest(request).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::InvalidSignature));
    assert_eq!(rejection.completed, PipelineStage::Validated);
    assert!(h.broker.publishes().is_empty());
}

#[tokio::test]
async fn missing_signature_is_its_own_rejection() {
    let h = harness();

    let mut request = signed_request("subject-0001");
    request.signature_header = None;

    let rejection = h.pipeline.ingest(request).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::MissingSignature));
}

#[tokio::test]
async fn in_body_signature_is_accepted_without_the_header() {
    let h = harness();

    let mut body = envelope("subject-0001");
    let signature = sign(&body);
    body["signature"] = json!(signature);
    let request = IngestRequest {
        credential: Some(RAW_KEY.to_string()),
        signature_header: None,
        body,
    };

    assert!(h.pipeline.ingest(request).await.is_ok());
}

#[tokio::test]
async fn persist_failure_means_zero_publishes() {
    let h = harness();
    h.store.fail_inserts();

    let rejection = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::Persist(_)));
    assert!(h.broker.publishes().is_empty());
}

#[tokio::test]
async fn publish_failure_surfaces_even_though_the_row_is_durable() {
    let h = harness();
    h.broker.fail_publishes();

    let rejection = h.pipeline.ingest(signed_request("subject-0001")).await.unwrap_err();
    assert!(matches!(rejection.error, GatewayError::Publish(_)));
    assert_eq!(h.store.row_count(), 1);
}

#[tokio::test]
async fn dropped_request_future_does_not_abandon_the_commit() {
    use std::time::Duration;

    let h = Arc::new(harness());
    h.broker.delay_publishes(Duration::from_millis(50));

    // Simulates a client disconnect mid-commit: the request future is
    // dropped while the publish is still in flight.
    let aborted = tokio::time::timeout(
        Duration::from_millis(10),
        h.pipeline.ingest(signed_request("subject-0001")),
    )
    .await;
    assert!(aborted.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.store.row_count(), 1);
    assert_eq!(h.broker.publishes().len(), 1);
}

#[tokio::test]
async fn repeated_insert_of_one_commit_record_stores_one_row() {
    use ingate_core::models::{CommitRecord, EventId, EventType};
    use ingate_pipeline::EventStore;

    let store = MockEventStore::new();
    let record = CommitRecord {
        event_id: EventId::new(),
        principal_id: PrincipalId::new(),
        subject_id: "subject-0001".to_string(),
        event_type: EventType::Query,
        payload: envelope("subject-0001"),
        signature: "sig".to_string(),
        received_at: chrono::Utc::now(),
    };

    assert_eq!(store.insert(&record).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(store.insert(&record).await.unwrap(), InsertOutcome::AlreadyApplied);
    assert_eq!(store.row_count(), 1);
}

#[tokio::test]
async fn concurrent_requests_for_one_subject_all_commit() {
    let h = Arc::new(harness());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.pipeline.ingest(signed_request("subject-0001")).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let report = handle.await.unwrap().expect("commit succeeds");
        ids.push(report.event_id);
    }

    ids.sort_by_key(|id| id.0);
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(h.store.row_count(), 8);
    assert_eq!(h.broker.publishes().len(), 8);
}
