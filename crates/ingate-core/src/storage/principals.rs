//! Repository for principal and credential database operations.
//!
//! Credentials are stored as a non-secret preview plus a salted one-way
//! digest; the raw secret never reaches this layer in persisted form. The
//! preview column bounds the candidate set for the resolver's verified
//! comparison so authentication never scans the whole table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{AuthCandidate, Principal, PrincipalId, RatePolicy},
};

/// A new principal row for provisioning flows and tests.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    /// Identifier for the new principal.
    pub id: PrincipalId,
    /// The user or organization owning the credential.
    pub owner_id: Uuid,
    /// Human-readable label.
    pub label: String,
    /// Whether the credential may authenticate requests.
    pub active: bool,
    /// Non-secret lookup preview (first characters of the raw secret).
    pub key_preview: String,
    /// Salted one-way digest, `salt_hex:digest_hex`.
    pub key_digest: String,
    /// Optional per-principal rate policy.
    pub rate_policy: Option<RatePolicy>,
}

/// Repository for principal database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates a new principal.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or constraints are violated.
    pub async fn create(&self, principal: &NewPrincipal) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO principals (
                id, owner_id, label, active, key_preview, key_digest,
                rate_limit_max, rate_limit_window_secs, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ",
        )
        .bind(principal.id)
        .bind(principal.owner_id)
        .bind(&principal.label)
        .bind(principal.active)
        .bind(&principal.key_preview)
        .bind(&principal.key_digest)
        .bind(principal.rate_policy.map(|p| i64::from(p.limit)))
        .bind(principal.rate_policy.map(|p| i64::from(p.window_secs)))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds active credential candidates whose stored preview matches.
    ///
    /// Only active records are returned, and the caller still has to run the
    /// verified digest comparison against each candidate; a preview match on
    /// its own authenticates nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_by_preview(&self, preview: &str) -> Result<Vec<AuthCandidate>> {
        let rows = sqlx::query(
            r"
            SELECT id, owner_id, label, active, key_digest,
                   rate_limit_max, rate_limit_window_secs, last_used_at
            FROM principals
            WHERE key_preview = $1 AND active = TRUE
            ",
        )
        .bind(preview)
        .fetch_all(&*self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let limit: Option<i64> = row.try_get("rate_limit_max").map_err(sqlx::Error::from)?;
            let window: Option<i64> =
                row.try_get("rate_limit_window_secs").map_err(sqlx::Error::from)?;
            let rate_policy = match (limit, window) {
                (Some(limit), Some(window)) => Some(RatePolicy::new(
                    u32::try_from(limit).unwrap_or(u32::MAX),
                    u32::try_from(window).unwrap_or(u32::MAX),
                )),
                _ => None,
            };

            candidates.push(AuthCandidate {
                principal: Principal {
                    id: row.try_get("id").map_err(sqlx::Error::from)?,
                    owner_id: row.try_get("owner_id").map_err(sqlx::Error::from)?,
                    label: row.try_get("label").map_err(sqlx::Error::from)?,
                    active: row.try_get("active").map_err(sqlx::Error::from)?,
                    rate_policy,
                    last_used_at: row.try_get("last_used_at").map_err(sqlx::Error::from)?,
                },
                key_digest: row.try_get("key_digest").map_err(sqlx::Error::from)?,
            });
        }

        Ok(candidates)
    }

    /// Updates the principal's `last_used_at` timestamp.
    ///
    /// Callers treat this as a best-effort side effect: the resolver logs
    /// failures and never surfaces them as request errors.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn touch_last_used(&self, id: PrincipalId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE principals
            SET last_used_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Deactivates a credential without deleting its row.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn deactivate(&self, id: PrincipalId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE principals
            SET active = FALSE
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Returns when a principal last authenticated, for provisioning tools.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_last_used(&self, id: PrincipalId) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT last_used_at FROM principals WHERE id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        Ok(row.and_then(|(ts,)| ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
