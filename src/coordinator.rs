use moka::future::Cache;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::claim_store::ClaimStore;
use crate::classifier::LeadClassifier;
use crate::errors::AppError;
use crate::fingerprint::derive_fingerprint;
use crate::models::{EnrichmentResult, NewRun, RunStatus};
use crate::run_ledger::RunLedger;

/// Coordinates the idempotent enrichment protocol.
///
/// For any fingerprint, at most one classification call is in flight at any
/// instant. That guarantee is enforced entirely by the claim store's atomic
/// conditional insert, so it holds across service replicas sharing one
/// database; nothing here relies on in-process mutual exclusion.
///
/// Lifecycle per request:
/// 1. Derive the fingerprint; identity-less payloads skip deduplication and
///    are processed independently.
/// 2. Return a prior successful result if one is settled (cache, then
///    ledger). Checked before claiming so settled fingerprints never take
///    new claims.
/// 3. Take the claim. Losing the race re-checks the ledger (the original
///    claimant may have just finished) and otherwise reports a retryable
///    conflict without touching the gateway.
/// 4. Classify, then write the terminal run record. Success leaves the claim
///    in place forever as the settled marker; failure records the attempt
///    and releases the claim so an identical submission can retry.
#[derive(Clone)]
pub struct RequestCoordinator {
    claims: Arc<dyn ClaimStore>,
    ledger: Arc<dyn RunLedger>,
    classifier: Arc<dyn LeadClassifier>,
    /// In-process shortcut for settled fingerprints. Safe because success
    /// records are immutable and their claims permanent; an entry can never
    /// be contradicted by a later write.
    settled_cache: Cache<String, EnrichmentResult>,
    retry_after_secs: u64,
}

impl RequestCoordinator {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        ledger: Arc<dyn RunLedger>,
        classifier: Arc<dyn LeadClassifier>,
        settled_cache: Cache<String, EnrichmentResult>,
        retry_after_secs: u64,
    ) -> Self {
        Self {
            claims,
            ledger,
            classifier,
            settled_cache,
            retry_after_secs,
        }
    }

    /// Processes one raw lead submission through the idempotency protocol.
    pub async fn handle(
        &self,
        source: &str,
        payload: Map<String, Value>,
    ) -> Result<EnrichmentResult, AppError> {
        let fingerprint = derive_fingerprint(&payload);

        if let Some(fp) = &fingerprint {
            if let Some(result) = self.lookup_settled(fp).await? {
                tracing::debug!("Returning settled result for fingerprint {}", fp);
                return Ok(result);
            }

            let claimed = self.claims.try_claim(fp).await?;
            if !claimed {
                // Lost the race, or a retry landed while the original
                // claimant was finishing. Re-checking the ledger closes the
                // window between the settled lookup and the claim attempt.
                if let Some(result) = self.lookup_settled(fp).await? {
                    tracing::debug!("Claim held but fingerprint {} settled; serving result", fp);
                    return Ok(result);
                }
                tracing::info!("Fingerprint {} is being processed elsewhere", fp);
                return Err(AppError::DuplicateInProgress {
                    retry_after_secs: self.retry_after_secs,
                });
            }
        }

        // The classify/record/release sequence runs in its own task so a
        // caller disconnect cannot abandon a taken claim before its terminal
        // ledger write.
        let coordinator = self.clone();
        let source = source.to_string();
        let task =
            tokio::spawn(async move { coordinator.process_claimed(source, payload, fingerprint).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AppError::InternalError(format!(
                "enrichment task failed: {}",
                e
            ))),
        }
    }

    /// Settled-result lookup: in-process cache first, then the ledger's most
    /// recent successful run.
    async fn lookup_settled(&self, fingerprint: &str) -> Result<Option<EnrichmentResult>, AppError> {
        if let Some(result) = self.settled_cache.get(fingerprint).await {
            return Ok(Some(result));
        }

        let Some(run) = self.ledger.most_recent_success(fingerprint).await? else {
            return Ok(None);
        };
        let Some(result_json) = run.result_json else {
            return Ok(None);
        };

        let result: EnrichmentResult = serde_json::from_value(result_json).map_err(|e| {
            AppError::InternalError(format!(
                "stored result for run {} does not match the result schema: {}",
                run.id, e
            ))
        })?;

        self.settled_cache
            .insert(fingerprint.to_string(), result.clone())
            .await;

        Ok(Some(result))
    }

    /// Runs the gateway call to a terminal outcome: exactly one run record
    /// per attempt, and no claim left behind on failure.
    async fn process_claimed(
        &self,
        source: String,
        payload: Map<String, Value>,
        fingerprint: Option<String>,
    ) -> Result<EnrichmentResult, AppError> {
        // Unbounded-latency network I/O. No storage transaction is held
        // here; the claim row is the only thing this request owns.
        let classified = self.classifier.classify(&payload).await;
        let payload_json = Value::Object(payload);

        match classified {
            Ok(result) => {
                let result_json = serde_json::to_value(&result).map_err(|e| {
                    AppError::InternalError(format!("Failed to serialize result: {}", e))
                })?;

                let recorded = self
                    .ledger
                    .record(NewRun {
                        source,
                        payload_json,
                        result_json: Some(result_json),
                        status: RunStatus::Success,
                        error: None,
                        fingerprint: fingerprint.clone(),
                        priority: None,
                        scheduled_at: None,
                    })
                    .await;

                match recorded {
                    Ok(_) => {
                        // The claim stays in place permanently: it now doubles
                        // as the settled marker for this fingerprint.
                        if let Some(fp) = fingerprint {
                            self.settled_cache.insert(fp, result.clone()).await;
                        }
                        Ok(result)
                    }
                    Err(storage_err) => {
                        // The audit write failed, so there is no settled
                        // record to stand behind the claim. Release it so the
                        // fingerprint is not stuck; the reaper covers the case
                        // where this release fails too.
                        if let Some(fp) = &fingerprint {
                            if let Err(release_err) = self.claims.release(fp).await {
                                tracing::error!(
                                    "Failed to release claim {} after ledger error: {}",
                                    fp,
                                    release_err
                                );
                            }
                        }
                        Err(storage_err)
                    }
                }
            }
            Err(err) => {
                let recorded = self
                    .ledger
                    .record(NewRun {
                        source,
                        payload_json,
                        result_json: None,
                        status: RunStatus::Failed,
                        error: Some(err.to_string()),
                        fingerprint: fingerprint.clone(),
                        priority: None,
                        scheduled_at: None,
                    })
                    .await;

                // Release regardless of the record outcome: a failed attempt
                // must never leave a claim that blocks all future retries.
                if let Some(fp) = &fingerprint {
                    if let Err(release_err) = self.claims.release(fp).await {
                        tracing::error!(
                            "Failed to release claim {} after failed attempt: {}",
                            fp,
                            release_err
                        );
                        return Err(release_err);
                    }
                }

                recorded?;
                Err(err)
            }
        }
    }
}
