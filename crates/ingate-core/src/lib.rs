//! Core domain models and storage for the Ingate event gateway.
//!
//! Provides strongly-typed domain primitives, the canonical JSON codec used
//! for signing, credential digest handling, the error taxonomy, and the
//! PostgreSQL repositories. All other crates depend on these foundational
//! types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod digest;
pub mod error;
pub mod models;
pub mod storage;

pub use error::{CoreError, FieldError, GatewayError, Result};
pub use models::{
    AuthCandidate, CommitRecord, EventId, EventType, InsertOutcome, Principal, PrincipalId,
    RateDecision, RatePolicy, StoredEvent,
};
pub use storage::Storage;
