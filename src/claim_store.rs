use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::AppError;

/// Persistent set of "in-flight or settled" fingerprints.
///
/// Existence of a claim is the sole concurrency gate for a fingerprint: it
/// is created by exactly one of any number of racing `try_claim` calls, kept
/// forever once processing succeeds, and deleted on failure so a later
/// submission can retry. Correctness rests on the backing store enforcing
/// key uniqueness at the storage layer, never on an application-level
/// check-then-insert.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Atomically inserts a claim for `fingerprint` if none exists.
    /// Returns true iff this call created it.
    async fn try_claim(&self, fingerprint: &str) -> Result<bool, AppError>;

    /// Deletes the claim for `fingerprint` if present. Idempotent: releasing
    /// an already-absent claim is a no-op, not an error.
    async fn release(&self, fingerprint: &str) -> Result<(), AppError>;
}

/// Postgres-backed claim store over the `lead_claims` table.
///
/// The primary key on `fingerprint` makes the conditional insert atomic
/// across arbitrary concurrent callers, including other service replicas
/// sharing the same database.
#[derive(Clone)]
pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn try_claim(&self, fingerprint: &str) -> Result<bool, AppError> {
        // ON CONFLICT DO NOTHING turns the duplicate-key case into
        // rows_affected == 0 instead of an error; any other failure is a
        // genuine storage error and propagates.
        let result = sqlx::query(
            "INSERT INTO lead_claims (fingerprint) VALUES ($1) ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, fingerprint: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM lead_claims WHERE fingerprint = $1")
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
