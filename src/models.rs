use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Urgency level extracted from a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Structured lead fields extracted from the raw payload.
///
/// Every field is optional: anything the gateway did not recognize stays
/// absent rather than being defaulted to a sentinel that could be confused
/// with real data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

/// Strict output schema for lead qualification.
///
/// Gateway output must deserialize into this shape and pass [`validate`]
/// before it is accepted; any mismatch is treated as a gateway failure.
///
/// [`validate`]: EnrichmentResult::validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub qualified: bool,
    pub score: i32,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub lead: ExtractedLead,
}

impl EnrichmentResult {
    /// Checks the constraints serde cannot express: score range and the
    /// reasons list bound.
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=100).contains(&self.score) {
            return Err(format!("score {} out of range 0-100", self.score));
        }
        if self.reasons.len() > 5 {
            return Err(format!("too many reasons: {} (max 5)", self.reasons.len()));
        }
        Ok(())
    }
}

/// Status of a processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// One audit entry in the run ledger. Append-only; rows with status
/// `success` are never mutated after creation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RunRecord {
    pub id: Uuid,
    pub fingerprint: Option<String>,
    pub source: String,
    pub payload_json: Value,
    pub result_json: Option<Value>,
    pub status: String,
    pub priority: Option<String>,
    pub scheduled_at: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a run ledger entry.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub source: String,
    pub payload_json: Value,
    pub result_json: Option<Value>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub fingerprint: Option<String>,
    pub priority: Option<String>,
    pub scheduled_at: Option<String>,
}

/// Query parameters accepted by `GET /runs`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RunQueryParams {
    /// Filter: success | failed | pending
    pub status: Option<String>,
    /// Filter by source (partial match).
    pub source: Option<String>,
    /// Search run ID, source, or error text.
    pub search: Option<String>,
    /// Filter on the stored result's qualified flag.
    pub qualified: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Body for `POST /runs`.
#[derive(Debug, Deserialize)]
pub struct RunCreateRequest {
    pub source: String,
    pub priority: Option<String>,
    pub scheduled_at: Option<String>,
    /// Raw lead data the classifier will process.
    pub payload_json: Value,
}

/// Body for `PUT /runs/:id`.
#[derive(Debug, Deserialize)]
pub struct RunUpdateRequest {
    pub status: Option<String>,
    pub result_json: Option<Value>,
    pub error: Option<String>,
}

/// A run as returned by the `/runs` endpoints, with qualified/score
/// flattened out of the stored result for frontend convenience.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub source: String,
    pub status: String,
    pub priority: Option<String>,
    pub scheduled_at: Option<String>,
    pub payload_json: Value,
    pub result_json: Option<Value>,
    pub error: Option<String>,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub qualified: Option<bool>,
    pub score: Option<i64>,
}

impl RunResponse {
    pub fn from_run(run: RunRecord) -> Self {
        let qualified = run
            .result_json
            .as_ref()
            .and_then(|r| r.get("qualified"))
            .and_then(|v| v.as_bool());
        let score = run
            .result_json
            .as_ref()
            .and_then(|r| r.get("score"))
            .and_then(|v| v.as_i64());

        Self {
            id: run.id,
            source: run.source,
            status: run.status,
            priority: run.priority,
            scheduled_at: run.scheduled_at,
            payload_json: run.payload_json,
            result_json: run.result_json,
            error: run.error,
            fingerprint: run.fingerprint,
            created_at: run.created_at,
            qualified,
            score,
        }
    }
}

/// Response for `GET /runs`.
#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
