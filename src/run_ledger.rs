use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{NewRun, RunQueryParams, RunRecord, RunUpdateRequest};

/// Append-oriented audit store: one row per processing attempt.
///
/// Only the two operations below take part in the idempotency protocol.
/// The list/get/update/delete operations on [`PgRunLedger`] exist for
/// operational visibility and are ordinary paginated queries.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Latest run with status `success` for this fingerprint, ordered by
    /// creation time descending.
    async fn most_recent_success(&self, fingerprint: &str) -> Result<Option<RunRecord>, AppError>;

    /// Appends one audit entry. Never overwrites prior entries.
    async fn record(&self, entry: NewRun) -> Result<RunRecord, AppError>;
}

/// Postgres-backed run ledger over the `runs` table.
#[derive(Clone)]
pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Paginated, optionally filtered list of runs, newest first.
    pub async fn list(&self, params: &RunQueryParams) -> Result<Vec<RunRecord>, AppError> {
        let limit = params.limit.unwrap_or(50).clamp(1, 200);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM runs WHERE 1=1");
        push_run_filters(&mut builder, params);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let runs = builder
            .build_query_as::<RunRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(runs)
    }

    /// Total number of runs matching the same filter set as [`list`].
    ///
    /// [`list`]: PgRunLedger::list
    pub async fn count(&self, params: &RunQueryParams) -> Result<i64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM runs WHERE 1=1");
        push_run_filters(&mut builder, params);

        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<RunRecord>, AppError> {
        let run = sqlx::query_as::<_, RunRecord>("SELECT * FROM runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(run)
    }

    /// Manually updates status, result, or error on a run.
    ///
    /// Runs that settled as `success` are immutable audit records; attempts
    /// to modify one are rejected rather than applied.
    pub async fn update(&self, id: Uuid, update: &RunUpdateRequest) -> Result<RunRecord, AppError> {
        let updated = sqlx::query_as::<_, RunRecord>(
            r#"
            UPDATE runs
            SET status = COALESCE($2, status),
                result_json = COALESCE($3, result_json),
                error = COALESCE($4, error)
            WHERE id = $1 AND status <> 'success'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status.as_deref())
        .bind(update.result_json.as_ref())
        .bind(update.error.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(run) => Ok(run),
            None => {
                if self.get(id).await?.is_some() {
                    Err(AppError::BadRequest(
                        "Run already settled as success; audit entries are immutable".to_string(),
                    ))
                } else {
                    Err(AppError::NotFound(format!("Run {} not found", id)))
                }
            }
        }
    }

    /// Hard-deletes a run record. Returns false when no such run exists.
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM runs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RunLedger for PgRunLedger {
    async fn most_recent_success(&self, fingerprint: &str) -> Result<Option<RunRecord>, AppError> {
        let run = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT * FROM runs
            WHERE fingerprint = $1 AND status = 'success'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    async fn record(&self, entry: NewRun) -> Result<RunRecord, AppError> {
        let run = sqlx::query_as::<_, RunRecord>(
            r#"
            INSERT INTO runs
                (id, fingerprint, source, payload_json, result_json, status,
                 priority, scheduled_at, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.fingerprint.as_deref())
        .bind(&entry.source)
        .bind(&entry.payload_json)
        .bind(entry.result_json.as_ref())
        .bind(entry.status.as_str())
        .bind(entry.priority.as_deref())
        .bind(entry.scheduled_at.as_deref())
        .bind(entry.error.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(run)
    }
}

/// Appends the WHERE clauses shared by `list` and `count`.
fn push_run_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &RunQueryParams) {
    if let Some(ref status) = params.status {
        builder.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(ref source) = params.source {
        builder
            .push(" AND source ILIKE ")
            .push_bind(format!("%{}%", source));
    }
    if let Some(ref search) = params.search {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (id::text ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR source ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR error ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(qualified) = params.qualified {
        builder
            .push(" AND result_json IS NOT NULL AND (result_json->>'qualified')::boolean = ")
            .push_bind(qualified);
    }
}
