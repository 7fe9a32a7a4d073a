//! HTTP request handlers for the Ingate API.
//!
//! Handlers are thin adapters: they pull credentials and signatures out of
//! the request, hand the body to the pipeline, and map the outcome to the
//! response contract (status code, error code, rate-limit headers).

pub mod health;
pub mod ingest;

pub use health::{health_check, liveness_check, readiness_check};
pub use ingest::ingest_event;
