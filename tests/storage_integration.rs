use std::env;

use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use rust_leadops_api::claim_store::{ClaimStore, PgClaimStore};
use rust_leadops_api::db::Database;
use rust_leadops_api::errors::AppError;
use rust_leadops_api::models::{NewRun, RunStatus, RunUpdateRequest};
use rust_leadops_api::reaper::reap_orphaned_claims;
use rust_leadops_api::run_ledger::{PgRunLedger, RunLedger};

/// Integration smoke tests against a real Postgres instance.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL to run.
async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.init_schema().await?;
    Ok(db)
}

/// Unique 64-char fingerprint per test run to avoid conflicts on repeated runs.
fn unique_fingerprint() -> String {
    hex::encode(Sha256::digest(Uuid::new_v4().as_bytes()))
}

#[tokio::test]
#[ignore]
async fn claim_lifecycle_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let claims = PgClaimStore::new(db.pool.clone());
    let fp = unique_fingerprint();

    // First claim wins, second observes it.
    assert!(claims.try_claim(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?);
    assert!(!claims.try_claim(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?);

    // Release is idempotent and reopens the fingerprint.
    claims.release(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    claims.release(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(claims.try_claim(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?);

    claims.release(&fp).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn run_ledger_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let ledger = PgRunLedger::new(db.pool.clone());
    let fp = unique_fingerprint();

    let failed = ledger
        .record(NewRun {
            source: "smoke-test".to_string(),
            payload_json: json!({"email": "smoke@test.com"}),
            result_json: None,
            status: RunStatus::Failed,
            error: Some("simulated failure".to_string()),
            fingerprint: Some(fp.clone()),
            priority: None,
            scheduled_at: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // A failed run is not a settled result.
    let settled = ledger
        .most_recent_success(&fp)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(settled.is_none());

    let success = ledger
        .record(NewRun {
            source: "smoke-test".to_string(),
            payload_json: json!({"email": "smoke@test.com"}),
            result_json: Some(json!({"qualified": true, "score": 70, "reasons": [], "lead": {}})),
            status: RunStatus::Success,
            error: None,
            fingerprint: Some(fp.clone()),
            priority: None,
            scheduled_at: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let settled = ledger
        .most_recent_success(&fp)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .expect("success run should be settled");
    assert_eq!(settled.id, success.id);

    // Settled success rows are immutable audit records.
    let update = RunUpdateRequest {
        status: Some("failed".to_string()),
        result_json: None,
        error: Some("should not apply".to_string()),
    };
    match ledger.update(success.id, &update).await {
        Err(AppError::BadRequest(_)) => {}
        other => anyhow::bail!("expected BadRequest updating a success run, got {:?}", other.map(|r| r.id)),
    }

    // Failed rows can still be corrected, then removed.
    ledger
        .update(failed.id, &update)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(ledger.delete(failed.id).await.map_err(|e| anyhow::anyhow!(e.to_string()))?);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn claim_reaper_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let ledger = PgRunLedger::new(db.pool.clone());

    // An orphaned claim: old, and no successful run behind it.
    let orphan = unique_fingerprint();
    sqlx::query(
        "INSERT INTO lead_claims (fingerprint, created_at) VALUES ($1, now() - interval '1 hour')",
    )
    .bind(&orphan)
    .execute(&db.pool)
    .await?;

    // A settled claim of the same age, backed by a successful run.
    let settled = unique_fingerprint();
    sqlx::query(
        "INSERT INTO lead_claims (fingerprint, created_at) VALUES ($1, now() - interval '1 hour')",
    )
    .bind(&settled)
    .execute(&db.pool)
    .await?;
    ledger
        .record(NewRun {
            source: "smoke-test".to_string(),
            payload_json: json!({"email": "settled@test.com"}),
            result_json: Some(json!({"qualified": false, "score": 5, "reasons": [], "lead": {}})),
            status: RunStatus::Success,
            error: None,
            fingerprint: Some(settled.clone()),
            priority: None,
            scheduled_at: None,
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let released = reap_orphaned_claims(&db.pool, 900).await?;
    assert!(released >= 1);

    let orphan_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM lead_claims WHERE fingerprint = $1)")
            .bind(&orphan)
            .fetch_one(&db.pool)
            .await?;
    let settled_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM lead_claims WHERE fingerprint = $1)")
            .bind(&settled)
            .fetch_one(&db.pool)
            .await?;

    assert!(!orphan_exists, "orphaned claim should have been released");
    assert!(settled_exists, "settled claim must never be reaped");

    Ok(())
}
