use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::EnrichmentResult;

/// System prompt driving lead qualification and structured extraction.
const SYSTEM_PROMPT: &str = r#"You are a lead qualification system. Analyze the raw lead payload and:
1. Classify lead quality (qualified: true/false)
2. Assign a score 0-100
3. List 1-5 reasons for the qualification decision
4. Extract structured fields: name, email, phone, budget (number), intent, urgency (low|medium|high), industry

Output ONLY valid JSON matching this exact schema (no markdown, no extra text):
{
  "qualified": true,
  "score": 82,
  "reasons": ["High budget", "Urgent intent"],
  "lead": {
    "name": "string or null",
    "email": "string or null",
    "phone": "string or null",
    "budget": number or null,
    "intent": "string or null",
    "urgency": "low" or "medium" or "high" or null,
    "industry": "string or null"
  }
}"#;

/// The external classification gateway.
///
/// May be slow, may fail, may return malformed output. Output failing strict
/// schema validation is reported identically to a transport-level failure.
#[async_trait]
pub trait LeadClassifier: Send + Sync {
    async fn classify(&self, payload: &Map<String, Value>) -> Result<EnrichmentResult, AppError>;
}

/// Client for an OpenAI-compatible chat-completions backend.
#[derive(Clone)]
pub struct OpenAiClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    /// Creates a new classifier client.
    ///
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`);
    /// configurable so tests can point it at a mock server.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create classifier client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LeadClassifier for OpenAiClassifier {
    async fn classify(&self, payload: &Map<String, Value>) -> Result<EnrichmentResult, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let user_content = serde_json::to_string(payload)
            .map_err(|e| AppError::InternalError(format!("Failed to serialize payload: {}", e)))?;

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_content},
            ],
            "temperature": 0.1,
        });

        tracing::debug!("Classifying lead with model {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::EnrichmentFailed(format!("classifier request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::EnrichmentFailed(format!(
                "classifier returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AppError::EnrichmentFailed(format!("failed to parse classifier response: {}", e))
        })?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                AppError::EnrichmentFailed("classifier returned empty response".to_string())
            })?;

        parse_enrichment_output(content)
    }
}

/// Parses and strictly validates the raw model output.
///
/// Models occasionally wrap the JSON in a Markdown code fence despite the
/// prompt; that wrapper is stripped before parsing.
pub fn parse_enrichment_output(content: &str) -> Result<EnrichmentResult, AppError> {
    let cleaned = strip_markdown_fence(content);

    let result: EnrichmentResult = serde_json::from_str(&cleaned).map_err(|e| {
        AppError::EnrichmentFailed(format!("classifier output failed schema validation: {}", e))
    })?;

    result.validate().map_err(|e| {
        AppError::EnrichmentFailed(format!("classifier output failed schema validation: {}", e))
    })?;

    Ok(result)
}

/// Removes a ```json ... ``` wrapper if present.
fn strip_markdown_fence(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    let opening = Regex::new(r"^```(?:json)?\s*").unwrap();
    let closing = Regex::new(r"\s*```$").unwrap();
    closing.replace(&opening.replace(text, ""), "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown_fence() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(fenced), "{\"a\": 1}");

        let bare_fence = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fence(bare_fence), "{\"a\": 1}");

        let plain = "{\"a\": 1}";
        assert_eq!(strip_markdown_fence(plain), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_rejects_out_of_range_score() {
        let output = r#"{"qualified": true, "score": 150, "reasons": [], "lead": {}}"#;
        let err = parse_enrichment_output(output).unwrap_err();
        assert!(matches!(err, AppError::EnrichmentFailed(_)));
    }

    #[test]
    fn test_parse_accepts_fenced_output() {
        let output = "```json\n{\"qualified\": false, \"score\": 12, \"reasons\": [\"No budget\"], \"lead\": {\"urgency\": \"low\"}}\n```";
        let result = parse_enrichment_output(output).unwrap();
        assert!(!result.qualified);
        assert_eq!(result.score, 12);
        assert_eq!(result.lead.urgency, Some(crate::models::Urgency::Low));
    }
}
