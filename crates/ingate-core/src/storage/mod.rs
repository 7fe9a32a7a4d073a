//! Database access layer implementing the repository pattern for the
//! gateway's durable state.
//!
//! The repository layer acts as an anti-corruption layer, translating
//! between domain models and database schemas. All database operations MUST
//! go through these repositories; direct SQL outside this module is
//! forbidden to maintain consistency.

use std::sync::Arc;

use sqlx::PgPool;

pub mod events;
pub mod principals;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for principal and credential lookups.
    pub principals: Arc<principals::Repository>,

    /// Repository for committed gateway events.
    pub events: Arc<events::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    ///
    /// All repositories share the same pool with Arc for efficient resource
    /// usage.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            principals: Arc::new(principals::Repository::new(pool.clone())),
            events: Arc::new(events::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// Executes a simple query to verify connectivity. Used by the `/ready`
    /// endpoint for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.events.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Verifies the container wires up; database behavior is covered by
        // integration tests against a live pool.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
