//! The request-scoped ingestion pipeline.
//!
//! One `ingest` call runs the full stage sequence: credential resolution,
//! rate limiting, schema validation, signature verification, normalization,
//! then the ordered persist-then-publish commit. A failing stage converts to
//! a typed rejection and no later stage executes. The pipeline holds no
//! per-request mutable state; concurrent requests share the collaborators
//! behind `Arc`.

use std::sync::Arc;

use chrono::Utc;
use ingate_core::{
    models::{CommitRecord, EventId, InsertOutcome, RateDecision, RatePolicy},
    GatewayError,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    broker::EventBroker,
    credential::{CredentialStore, PrincipalDirectory},
    normalize::Normalizer,
    rate_limit::{CounterStore, RateLimiter},
    signature::SignatureVerifier,
    store::EventStore,
    validate::{SchemaValidator, ValidationConfig},
};

/// Stages a request moves through, in order.
///
/// Every transition requires the previous stage's success; a failure moves
/// the request to `Rejected` and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Request accepted for processing.
    Received,
    /// Credential resolved to an active principal.
    Authenticated,
    /// Rate window checked and within budget.
    RateChecked,
    /// Envelope passed structural and temporal validation.
    Validated,
    /// Submitted signature verified.
    SignatureVerified,
    /// Envelope normalized and stamped.
    Normalized,
    /// Persisted and published.
    Committed,
    /// A stage failed; no later stage ran.
    Rejected,
}

/// The raw material of one ingestion request.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Bearer credential, if the caller supplied one.
    pub credential: Option<String>,

    /// Value of the signature header, if present. Falls back to the in-body
    /// `signature` field when absent.
    pub signature_header: Option<String>,

    /// The JSON envelope as submitted.
    pub body: Value,
}

/// Pipeline construction parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Broker channel committed events are published to.
    pub channel: String,

    /// Shared secret for envelope signature verification.
    pub signing_secret: String,

    /// Temporal validation bounds.
    pub validation: ValidationConfig,

    /// Rate policy applied to principals without an override.
    pub default_policy: RatePolicy,
}

/// Successful ingestion summary.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Server-assigned identifier for the committed event.
    pub event_id: EventId,

    /// Whether the row was new or an already-applied duplicate.
    pub outcome: InsertOutcome,

    /// The rate decision for this request, for response headers.
    pub rate: RateDecision,
}

/// A typed rejection, with the rate decision when that stage was reached.
#[derive(Debug)]
pub struct IngestRejection {
    /// Why the request was rejected.
    pub error: GatewayError,

    /// The last stage that completed before the failure.
    pub completed: PipelineStage,

    /// Present when the rate-limiter stage ran, so 4xx responses can still
    /// carry rate headers.
    pub rate: Option<RateDecision>,
}

impl IngestRejection {
    fn new(error: GatewayError, completed: PipelineStage) -> Self {
        Self { error, completed, rate: None }
    }

    fn with_rate(error: GatewayError, completed: PipelineStage, rate: RateDecision) -> Self {
        Self { error, completed, rate: Some(rate) }
    }
}

/// Orchestrates the full ingestion stage sequence.
pub struct EventPipeline {
    credentials: CredentialStore,
    limiter: RateLimiter,
    validator: SchemaValidator,
    verifier: SignatureVerifier,
    normalizer: Normalizer,
    store: Arc<dyn EventStore>,
    broker: Arc<dyn EventBroker>,
    channel: String,
}

impl EventPipeline {
    /// Builds a pipeline over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the signing secret is empty. The process
    /// should refuse to start rather than reject every request at runtime.
    pub fn new(
        config: PipelineConfig,
        directory: Arc<dyn PrincipalDirectory>,
        counters: Arc<dyn CounterStore>,
        store: Arc<dyn EventStore>,
        broker: Arc<dyn EventBroker>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            credentials: CredentialStore::new(directory),
            limiter: RateLimiter::new(counters, config.default_policy),
            validator: SchemaValidator::new(config.validation),
            verifier: SignatureVerifier::new(config.signing_secret)?,
            normalizer: Normalizer::new(),
            store,
            broker,
            channel: config.channel,
        })
    }

    /// Runs one request through every stage.
    ///
    /// Once the commit step starts it runs to completion or explicit
    /// failure: persist and publish execute on their own task, so dropping
    /// this future cannot abandon a commit between the two sinks.
    ///
    /// # Errors
    ///
    /// Returns the first stage's failure as a typed rejection; stages after
    /// a failing stage never execute.
    #[instrument(skip_all, fields(principal_id, event_id))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, IngestRejection> {
        let principal = self
            .credentials
            .resolve(request.credential.as_deref())
            .await
            .map_err(|e| IngestRejection::new(e, PipelineStage::Received))?;
        tracing::Span::current().record("principal_id", tracing::field::display(principal.id));

        let rate = self.limiter.check(&principal.id.to_string(), principal.rate_policy).await;
        if !rate.allowed {
            return Err(IngestRejection::with_rate(
                GatewayError::RateLimited { reset_at_ms: rate.reset_at_ms },
                PipelineStage::Authenticated,
                rate,
            ));
        }

        let validated = self
            .validator
            .validate(&request.body)
            .map_err(|e| IngestRejection::with_rate(e, PipelineStage::RateChecked, rate))?;

        let submitted = request
            .signature_header
            .as_deref()
            .or_else(|| request.body.get("signature").and_then(Value::as_str));
        self.verifier
            .verify(&request.body, submitted)
            .map_err(|e| IngestRejection::with_rate(e, PipelineStage::Validated, rate))?;
        // verify() rejected the None case above.
        let signature = submitted.unwrap_or_default().to_string();

        let received_at = Utc::now();
        let payload = self.normalizer.normalize(&request.body, received_at);

        let event_id = EventId::new();
        tracing::Span::current().record("event_id", tracing::field::display(event_id));
        let record = CommitRecord {
            event_id,
            principal_id: principal.id,
            subject_id: validated.subject_id,
            event_type: validated.event_type,
            payload,
            signature,
            received_at,
        };

        // The commit runs on its own task: dropping the request future
        // (client disconnect, handler timeout) must not abandon it between
        // persist and publish.
        let store = Arc::clone(&self.store);
        let broker = Arc::clone(&self.broker);
        let channel = self.channel.clone();
        let commit = tokio::spawn(async move {
            let outcome = store
                .insert(&record)
                .await
                .map_err(|e| GatewayError::Persist(e.to_string()))?;

            // Persist happens-before publish. A publish failure here is
            // surfaced even though the row is durable; the caller may retry
            // and the duplicate-safe insert keeps storage single-copy.
            broker
                .publish(&channel, &record.subject_id, &record)
                .await
                .map_err(|e| GatewayError::Publish(e.to_string()))?;

            Ok::<_, GatewayError>((outcome, record))
        });

        let (outcome, record) = match commit.await {
            Ok(Ok(committed)) => committed,
            Ok(Err(e)) => {
                return Err(IngestRejection::with_rate(e, PipelineStage::Normalized, rate))
            },
            Err(e) => {
                return Err(IngestRejection::with_rate(
                    GatewayError::Persist(format!("commit task failed: {e}")),
                    PipelineStage::Normalized,
                    rate,
                ))
            },
        };

        info!(
            event_type = %record.event_type,
            subject_id = %record.subject_id,
            "event committed"
        );

        Ok(IngestReport { event_id, outcome, rate })
    }
}
