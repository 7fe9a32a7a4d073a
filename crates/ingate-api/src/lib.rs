//! Ingate HTTP API.
//!
//! Configuration, routing, and the request handlers that front the
//! ingestion pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use ingate_core::Storage;
use ingate_pipeline::EventPipeline;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared application state for request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ingestion pipeline.
    pub pipeline: Arc<EventPipeline>,

    /// Storage, used by readiness probes.
    pub storage: Arc<Storage>,
}
