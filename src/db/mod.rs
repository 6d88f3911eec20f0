//! # State Store
//!
//! Async database management built on sqlx + Postgres. Holds transactions,
//! gateway events, inbound Gateway callbacks, outgoing client callbacks, the
//! TSQ queue, and the audit log — the single source of coordination between
//! every worker.
//!
//! Workers claim work with `SELECT ... FOR UPDATE SKIP LOCKED` so two
//! workers never process the same row simultaneously, and a crashed worker
//! never permanently blocks a row: the lock releases on rollback.

pub mod audit;
pub mod callbacks;
pub mod client_callbacks;
pub mod events;
pub mod participants;
pub mod transactions;
pub mod tsq_queue;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

/// Shared handle to the connection pool. Cheap to clone; hand a clone to
/// each worker task.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Connects with a bounded pool and runs pending migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            crate::Error::Internal(anyhow::anyhow!("failed to run migrations: {e}"))
        })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
pub mod test_support {
    //! Shared helper for integration tests: connect to a real Postgres via
    //! `DATABASE_URL`, or skip the test if one isn't reachable. Mirrors the
    //! pattern used for coordinator tests elsewhere in the transfer-engine
    //! corpus this module is grounded on.
    use super::DatabaseManager;

    pub async fn test_db() -> Option<DatabaseManager> {
        let url = std::env::var("DATABASE_URL").ok()?;
        DatabaseManager::new(&url).await.ok()
    }
}
