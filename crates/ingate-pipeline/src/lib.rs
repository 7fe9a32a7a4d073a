//! The authenticated event-ingestion pipeline.
//!
//! Orchestrates credential resolution, rate limiting, schema validation,
//! signature verification, normalization, and the ordered persist-then-publish
//! commit into one request-scoped operation. Collaborators (principal
//! directory, counter store, event store, broker) are traits so the pipeline
//! can run against PostgreSQL/Redis in production and in-memory doubles in
//! tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod credential;
pub mod normalize;
pub mod pipeline;
pub mod rate_limit;
pub mod signature;
pub mod store;
pub mod testing;
pub mod validate;

pub use broker::{EventBroker, RedisStreamBroker};
pub use credential::{CredentialStore, PrincipalDirectory};
pub use normalize::Normalizer;
pub use pipeline::{
    EventPipeline, IngestRejection, IngestReport, IngestRequest, PipelineConfig, PipelineStage,
};
pub use rate_limit::{
    CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore, WindowCount,
};
pub use signature::SignatureVerifier;
pub use store::{EventStore, PostgresDirectory, PostgresEventStore};
pub use validate::{SchemaValidator, ValidatedEnvelope, ValidationConfig};
