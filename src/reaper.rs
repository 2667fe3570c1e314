use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Background reconciliation for orphaned claims.
///
/// A crash between taking a claim and writing the terminal run record leaves
/// a claim with no run behind it, which would block every future submission
/// of that fingerprint. This task periodically releases such claims once
/// they are older than the grace period. Claims backed by a successful run
/// are the permanent settled markers and are never touched.
///
/// The grace period must comfortably exceed the classifier timeout so an
/// attempt still in flight is never swept; releasing one early costs at most
/// a duplicate classification, never an audit record.
pub fn spawn_claim_reaper(pool: PgPool, interval: Duration, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let grace_secs = grace.as_secs() as i64;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match reap_orphaned_claims(&pool, grace_secs).await {
                Ok(0) => {}
                Ok(released) => tracing::info!("Released {} orphaned claim(s)", released),
                Err(e) => tracing::error!("Claim reaper sweep failed: {}", e),
            }
        }
    })
}

/// Deletes claims older than `grace_secs` that have no successful run for
/// the same fingerprint. Returns how many were released.
pub async fn reap_orphaned_claims(pool: &PgPool, grace_secs: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM lead_claims c
        WHERE c.created_at < now() - ($1 * interval '1 second')
          AND NOT EXISTS (
              SELECT 1 FROM runs r
              WHERE r.fingerprint = c.fingerprint AND r.status = 'success'
          )
        "#,
    )
    .bind(grace_secs)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
