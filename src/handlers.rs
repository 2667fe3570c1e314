use crate::classifier::LeadClassifier;
use crate::coordinator::RequestCoordinator;
use crate::errors::{AppError, ResultExt};
use crate::fingerprint::extract_source;
use crate::models::{
    EnrichmentResult, NewRun, RunCreateRequest, RunListResponse, RunQueryParams, RunResponse,
    RunStatus, RunUpdateRequest,
};
use crate::run_ledger::{PgRunLedger, RunLedger};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// The idempotent enrichment coordinator behind `POST /enrich-lead`.
    pub coordinator: RequestCoordinator,
    /// Run ledger, used directly by the auxiliary `/runs` endpoints.
    pub ledger: PgRunLedger,
    /// Classification gateway, used directly by the `POST /runs` flow.
    pub classifier: Arc<dyn LeadClassifier>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-leadops-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /enrich-lead
///
/// Enriches and qualifies a lead from a raw JSON payload.
///
/// - Idempotent: same email+phone returns the cached result
/// - Retry-safe: at most one concurrent classification per fingerprint
/// - Auditable: every attempt is logged to the run ledger
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - The raw lead payload (arbitrary JSON object).
///
/// # Returns
///
/// * `Result<Json<EnrichmentResult>, AppError>` - The enrichment result or a
///   classified failure (conflict, upstream failure, storage failure).
pub async fn enrich_lead(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<EnrichmentResult>, AppError> {
    let Value::Object(payload) = payload else {
        return Err(AppError::BadRequest(
            "Payload must be a JSON object".to_string(),
        ));
    };

    let source = extract_source(&payload);
    tracing::info!("POST /enrich-lead - source: {}", source);

    let result = state.coordinator.handle(&source, payload).await?;
    Ok(Json(result))
}

/// GET /runs
///
/// Returns a paginated, optionally filtered list of runs.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `params` - Filters: status, source (partial), search, qualified, plus
///   limit/offset pagination.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunQueryParams>,
) -> Result<Json<RunListResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);

    let runs = state.ledger.list(&params).await.context("listing runs")?;
    let total = state.ledger.count(&params).await.context("counting runs")?;

    Ok(Json(RunListResponse {
        runs: runs.into_iter().map(RunResponse::from_run).collect(),
        total,
        limit,
        offset,
    }))
}

/// GET /runs/:id
///
/// Fetches a single run by UUID.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, AppError> {
    let run = state
        .ledger
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))?;

    Ok(Json(RunResponse::from_run(run)))
}

/// POST /runs
///
/// Creates a run and immediately processes it through classification.
///
/// Flow:
/// 1. Save the run as status `pending` with the raw payload
/// 2. Classify the lead (score, qualified, reasons, extracted fields)
/// 3. Update the run to `success` + result (or `failed` + error)
/// 4. Return the completed run
///
/// This administrative path is keyed by nothing and deliberately bypasses
/// the deduplication protocol; `POST /enrich-lead` is the idempotent entry
/// point.
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunCreateRequest>,
) -> Result<(StatusCode, Json<RunResponse>), AppError> {
    let Some(payload) = request.payload_json.as_object() else {
        return Err(AppError::BadRequest(
            "payload_json must be a JSON object".to_string(),
        ));
    };
    let payload = payload.clone();

    tracing::info!("POST /runs - source: {}", request.source);

    let pending = state
        .ledger
        .record(NewRun {
            source: request.source.clone(),
            payload_json: request.payload_json.clone(),
            result_json: None,
            status: RunStatus::Pending,
            error: None,
            fingerprint: None,
            priority: request.priority.clone(),
            scheduled_at: request.scheduled_at.clone(),
        })
        .await?;

    let update = match state.classifier.classify(&payload).await {
        Ok(result) => {
            let result_json = serde_json::to_value(&result).map_err(|e| {
                AppError::InternalError(format!("Failed to serialize result: {}", e))
            })?;
            RunUpdateRequest {
                status: Some(RunStatus::Success.as_str().to_string()),
                result_json: Some(result_json),
                error: None,
            }
        }
        Err(e) => RunUpdateRequest {
            status: Some(RunStatus::Failed.as_str().to_string()),
            result_json: None,
            error: Some(e.to_string()),
        },
    };

    let completed = state.ledger.update(pending.id, &update).await?;

    Ok((StatusCode::CREATED, Json(RunResponse::from_run(completed))))
}

/// PUT /runs/:id
///
/// Manually updates status, result, or error on a run. Runs settled as
/// `success` are immutable audit records and cannot be modified.
pub async fn update_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RunUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    if request.status.is_none() && request.result_json.is_none() && request.error.is_none() {
        return Err(AppError::BadRequest(
            "Provide at least one field: status, result_json, or error".to_string(),
        ));
    }

    if let Some(ref status) = request.status {
        if !matches!(status.as_str(), "pending" | "success" | "failed") {
            return Err(AppError::BadRequest(
                "status must be one of: pending, success, failed".to_string(),
            ));
        }
    }

    let updated = state.ledger.update(id, &request).await?;

    Ok(Json(
        json!({"success": true, "id": updated.id, "status": updated.status}),
    ))
}

/// DELETE /runs/:id
///
/// Hard-deletes a run record.
pub async fn delete_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.ledger.delete(id).await? {
        return Err(AppError::NotFound(format!("Run {} not found", id)));
    }

    Ok(Json(json!({"success": true, "deleted": id})))
}
