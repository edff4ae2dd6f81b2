//! Story field suggestions.
//!
//! A `FieldSuggester` proposes values for a partial story draft. Proposals are
//! merged with `merge_suggestion`, which only fills fields the user left empty
//! and puts every proposed value through the same text checks as story
//! creation. Rejected values are reported by name and dropped.

use async_trait::async_trait;
use pm_types::{StoryDraft, StorySuggestion};
use serde_json::{json, Value};

use crate::config::OpenAiConfig;
use crate::vault::schema::clean_text_field;

const SYSTEM_PROMPT: &str = "You are a product manager writing user stories. \
Only return JSON, no markdown. Keep answers concise. \
Use null for fields you cannot infer.";

#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("story suggestions are not configured (set OPENAI_API_KEY)")]
    Unavailable,
    #[error("suggestion request failed: {0}")]
    Request(String),
    #[error("suggestion service returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("could not read suggestion: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SuggestError {
    fn from(e: reqwest::Error) -> Self {
        SuggestError::Request(e.to_string())
    }
}

/// Source of suggested story fields
#[async_trait]
pub trait FieldSuggester: Send + Sync {
    /// Propose values for `draft`. The result may contain any subset of fields.
    async fn suggest(&self, draft: &StoryDraft) -> Result<StoryDraft, SuggestError>;
}

/// Chat-completions backed suggester
pub struct OpenAiSuggester {
    client: reqwest::Client,
    api_key: String,
    model: String,
    fallback_model: String,
    base_url: String,
}

impl OpenAiSuggester {
    /// `None` when no API key is configured
    pub fn from_config(config: &OpenAiConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<reqwest::Response, SuggestError> {
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "response_format": { "type": "json_object" }
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl FieldSuggester for OpenAiSuggester {
    async fn suggest(&self, draft: &StoryDraft) -> Result<StoryDraft, SuggestError> {
        let prompt = build_prompt(draft);

        let mut resp = self.complete(&self.model, &prompt).await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            if !should_retry_with_fallback(status, &body, &self.model, &self.fallback_model) {
                return Err(SuggestError::Upstream { status, body });
            }
            log::warn!(
                "[STORY_ASSIST] Model {} rejected (HTTP {}), retrying with {}",
                self.model,
                status,
                self.fallback_model
            );
            resp = self.complete(&self.fallback_model, &prompt).await?;
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SuggestError::Upstream { status, body });
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| SuggestError::Parse(e.to_string()))?;
        completion_fields(&value)
    }
}

/// Retry only when a distinct fallback exists and the failure looks like a
/// model problem
fn should_retry_with_fallback(status: u16, body: &str, model: &str, fallback: &str) -> bool {
    model != fallback && (status == 404 || body.to_lowercase().contains("model"))
}

fn build_prompt(draft: &StoryDraft) -> String {
    let or_blank = |v: &Option<String>| v.clone().unwrap_or_default();
    format!(
        "Generate missing story fields. Return JSON only with keys: title, asA, iWant, soThat, \
         acceptanceCriteria (array of strings).\n\n\
         Description: {}\nExisting title: {}\nExisting asA: {}\nExisting iWant: {}\n\
         Existing soThat: {}\nExisting acceptanceCriteria: {}",
        draft.description,
        or_blank(&draft.title),
        or_blank(&draft.as_a),
        or_blank(&draft.i_want),
        or_blank(&draft.so_that),
        draft.acceptance_criteria.clone().unwrap_or_default().join("; ")
    )
}

/// Pull the JSON object out of a chat-completions response
fn completion_fields(response: &Value) -> Result<StoryDraft, SuggestError> {
    let content = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| SuggestError::Parse("response has no message content".to_string()))?;

    serde_json::from_str(content).map_err(|e| SuggestError::Parse(e.to_string()))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Fill the empty fields of `draft` from `suggested`.
///
/// User-supplied values are never replaced. `description` is never taken
/// from a suggestion.
pub fn merge_suggestion(draft: StoryDraft, suggested: StoryDraft) -> StorySuggestion {
    let mut merged = draft;
    let mut filled = Vec::new();
    let mut rejected = Vec::new();

    let text_fields = [
        ("title", &mut merged.title, suggested.title),
        ("asA", &mut merged.as_a, suggested.as_a),
        ("iWant", &mut merged.i_want, suggested.i_want),
        ("soThat", &mut merged.so_that, suggested.so_that),
    ];
    for (name, slot, proposal) in text_fields {
        if !is_blank(slot) || is_blank(&proposal) {
            continue;
        }
        let proposal = proposal.unwrap_or_default();
        match clean_text_field(name, &proposal) {
            Ok(value) => {
                *slot = Some(value);
                filled.push(name.to_string());
            }
            Err(reason) => {
                log::debug!("[STORY_ASSIST] Dropped suggested {}: {}", name, reason);
                rejected.push(name.to_string());
            }
        }
    }

    let criteria_empty = merged
        .acceptance_criteria
        .as_ref()
        .map(|c| c.iter().all(|i| i.trim().is_empty()))
        .unwrap_or(true);
    let proposed: Vec<String> = suggested
        .acceptance_criteria
        .unwrap_or_default()
        .into_iter()
        .filter(|i| !i.trim().is_empty())
        .collect();
    if criteria_empty && !proposed.is_empty() {
        let cleaned: Result<Vec<String>, String> = proposed
            .iter()
            .map(|i| clean_text_field("acceptanceCriteria", i))
            .collect();
        match cleaned {
            Ok(items) => {
                merged.acceptance_criteria = Some(items);
                filled.push("acceptanceCriteria".to_string());
            }
            Err(reason) => {
                log::debug!("[STORY_ASSIST] Dropped suggested acceptanceCriteria: {}", reason);
                rejected.push("acceptanceCriteria".to_string());
            }
        }
    }

    StorySuggestion {
        draft: merged,
        filled,
        rejected,
    }
}
