//! Credential resolution: opaque bearer token to active principal.
//!
//! Resolution runs in two steps to stay fast and leak nothing: a non-secret
//! preview narrows the candidate set, then each candidate's salted digest is
//! verified constant-time. The failure mode is identical whether the preview
//! matched no rows or every digest comparison failed.

use std::sync::Arc;

use async_trait::async_trait;
use ingate_core::{
    digest,
    error::Result,
    models::{AuthCandidate, Principal, PrincipalId},
    GatewayError,
};
use tracing::warn;

/// Lookup operations the resolver needs from principal storage.
///
/// Production implementations are backed by the PostgreSQL principals
/// repository; tests provide in-memory doubles.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync + 'static {
    /// Finds active credential candidates whose stored preview matches.
    async fn find_active_by_preview(&self, preview: &str) -> Result<Vec<AuthCandidate>>;

    /// Updates the principal's `last_used_at` timestamp.
    async fn touch_last_used(&self, id: PrincipalId) -> Result<()>;
}

/// Resolves bearer credentials to active principals.
pub struct CredentialStore {
    directory: Arc<dyn PrincipalDirectory>,
}

impl CredentialStore {
    /// Creates a credential store over the given directory.
    pub fn new(directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves a raw bearer credential to its principal.
    ///
    /// On success the principal's `last_used_at` is touched on a spawned
    /// task; a touch failure is logged and never surfaced to the request.
    ///
    /// # Errors
    ///
    /// `MissingCredential` when no credential was supplied,
    /// `InvalidCredential` when no active candidate's digest verifies. The
    /// two invalid cases (no preview match, digest mismatch) are deliberately
    /// indistinguishable to the caller.
    pub async fn resolve(
        &self,
        raw: Option<&str>,
    ) -> std::result::Result<Principal, GatewayError> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(GatewayError::MissingCredential),
        };

        let preview = digest::preview(raw);
        let candidates = self
            .directory
            .find_active_by_preview(&preview)
            .await
            .map_err(|e| GatewayError::Configuration(format!("credential lookup failed: {e}")))?;

        for candidate in candidates {
            if digest::verify(raw, &candidate.key_digest) {
                self.touch_last_used(candidate.principal.id);
                return Ok(candidate.principal);
            }
        }

        Err(GatewayError::InvalidCredential)
    }

    fn touch_last_used(&self, id: PrincipalId) {
        let directory = self.directory.clone();
        tokio::spawn(async move {
            if let Err(e) = directory.touch_last_used(id).await {
                warn!(principal_id = %id, error = %e, "failed to update last_used_at");
            }
        });
    }
}
