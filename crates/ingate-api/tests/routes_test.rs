//! Router-level tests exercising the HTTP contract end to end over mock
//! collaborators: status codes, error codes, and rate-limit headers.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use ingate_api::{create_router, AppState};
use ingate_core::{
    digest,
    models::{AuthCandidate, Principal, PrincipalId, RatePolicy},
    Storage,
};
use ingate_pipeline::{
    testing::{MockBroker, MockDirectory, MockEventStore},
    EventPipeline, MemoryCounterStore, PipelineConfig, SignatureVerifier, ValidationConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const RAW_KEY: &str = "sk_live_0123456789abcdef";
const SECRET: &str = "test-signing-secret";

fn router_with_policy(policy: Option<RatePolicy>) -> Router {
    let candidate = AuthCandidate {
        principal: Principal {
            id: PrincipalId::new(),
            owner_id: Uuid::new_v4(),
            label: "test-key".to_string(),
            active: true,
            rate_policy: policy,
            last_used_at: None,
        },
        key_digest: digest::compute(RAW_KEY),
    };

    let pipeline = EventPipeline::new(
        PipelineConfig {
            channel: "gateway.events".to_string(),
            signing_secret: SECRET.to_string(),
            validation: ValidationConfig::default(),
            default_policy: RatePolicy::new(100, 60),
        },
        Arc::new(MockDirectory::with_candidates(vec![candidate])),
        Arc::new(MemoryCounterStore::new()),
        Arc::new(MockEventStore::new()),
        Arc::new(MockBroker::new()),
    )
    .expect("pipeline construction");

    // Lazy pool: never connected, only the ingest route is exercised here.
    let pool = sqlx::PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
    let state = AppState { pipeline: Arc::new(pipeline), storage: Arc::new(Storage::new(pool)) };

    create_router(state, Duration::from_secs(30))
}

fn router() -> Router {
    router_with_policy(None)
}

fn envelope() -> Value {
    json!({
        "event_type": "ai.query",
        "subject_id": "subject-0001",
        "subject_version": "1.4.2",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "metadata": {"session": "sess-42"}
    })
}

fn signed_post(body: &Value, credential: Option<&str>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json");
    if let Some(credential) = credential {
        builder = builder.header("authorization", format!("Bearer {credential}"));
    }
    if let Some(signature) = signature {
        builder = builder.header("x-ingate-signature", signature);
    }
    builder.body(Body::from(serde_json::to_vec(body).unwrap())).unwrap()
}

fn sign(body: &Value) -> String {
    SignatureVerifier::new(SECRET).unwrap().sign(body)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn successful_ingestion_returns_event_id_and_rate_headers() {
    let body = envelope();
    let signature = sign(&body);

    let response =
        router().oneshot(signed_post(&body, Some(RAW_KEY), Some(&signature))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let json = json_body(response).await;
    assert_eq!(json["success"], json!(true));
    assert!(Uuid::parse_str(json["event_id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn missing_credential_is_a_coded_401() {
    let body = envelope();
    let signature = sign(&body);

    let response = router().oneshot(signed_post(&body, None, Some(&signature))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], json!("E1001"));
}

#[tokio::test]
async fn unknown_credential_is_a_coded_401() {
    let body = envelope();
    let signature = sign(&body);

    let response = router()
        .oneshot(signed_post(&body, Some("sk_live_ffffffffffffffff"), Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], json!("E1002"));
}

#[tokio::test]
async fn invalid_signature_is_a_coded_401() {
    let body = envelope();

    let response =
        router().oneshot(signed_post(&body, Some(RAW_KEY), Some("deadbeef"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], json!("E1006"));
}

#[tokio::test]
async fn invalid_envelope_returns_field_details() {
    let mut body = envelope();
    body["subject_id"] = json!("short");
    body["bogus"] = json!(1);
    let signature = sign(&body);

    let response =
        router().oneshot(signed_post(&body, Some(RAW_KEY), Some(&signature))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], json!("E1004"));
    let details = json["error"]["details"].as_array().expect("details array");
    let fields: Vec<&str> = details.iter().map(|d| d["field"].as_str().unwrap()).collect();
    assert!(fields.contains(&"subject_id"));
    assert!(fields.contains(&"bogus"));
}

#[tokio::test]
async fn rate_limited_requests_get_429_with_headers() {
    let router = router_with_policy(Some(RatePolicy::new(1, 60)));
    let body = envelope();
    let signature = sign(&body);

    let first = router
        .clone()
        .oneshot(signed_post(&body, Some(RAW_KEY), Some(&signature)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second =
        router.oneshot(signed_post(&body, Some(RAW_KEY), Some(&signature))).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let json = json_body(second).await;
    assert_eq!(json["error"]["code"], json!("E1003"));
}

#[tokio::test]
async fn liveness_does_not_touch_the_database() {
    let response = router()
        .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], json!("alive"));
}
