//! LLM port
//!
//! Structured decision and lesson-extraction calls against a language model.
//! The default implementation talks to the Anthropic messages API; tests and
//! embedders supply their own `LlmPort`. All failure is surfaced as
//! `LlmError` - callers map it to a safe default (`wait`, no lesson) and
//! never let it escape a loop stage.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AgentAction;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Error types for LLM port calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Decision returned by the model for one Think-stage prompt.
///
/// `decision` stays a string here; Think maps anything that is not exactly
/// `"act"` to waiting.
#[derive(Debug, Clone, Deserialize)]
pub struct DecideOutcome {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub action: Option<AgentAction>,
}

/// Lesson body proposed by the model during Reflect.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonDraft {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub should_not: String,
    #[serde(default)]
    pub should_instead: String,
    #[serde(default = "default_importance")]
    pub importance: String,
}

fn default_importance() -> String {
    "medium".to_string()
}

/// Full Reflect-stage extraction result.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonExtraction {
    #[serde(default, rename = "should_save_lesson")]
    pub should_save: bool,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub lesson: Option<LessonDraft>,
}

/// The two structured calls the loop makes against a language model.
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Decide whether to act right now. Must not panic; all failure comes
    /// back as `LlmError`.
    async fn decide(&self, prompt: &str) -> Result<DecideOutcome, LlmError>;

    /// Extract a durable lesson from a negative reaction.
    async fn extract_lesson(&self, prompt: &str) -> Result<LessonExtraction, LlmError>;
}

/// Pull the JSON payload out of a model response that may wrap it in
/// markdown code fences or surrounding prose.
pub fn extract_json_block(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let rest = &response[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = response.find("```") {
        let rest = &response[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].trim();
        }
    }
    response.trim()
}

/// Parse a Think-stage response body.
pub fn parse_decide(response: &str) -> Result<DecideOutcome, LlmError> {
    serde_json::from_str(extract_json_block(response))
        .map_err(|e| LlmError::Malformed(format!("{e} in: {}", truncate(response, 200))))
}

/// Parse a Reflect-stage response body.
pub fn parse_lesson(response: &str) -> Result<LessonExtraction, LlmError> {
    serde_json::from_str(extract_json_block(response))
        .map_err(|e| LlmError::Malformed(format!("{e} in: {}", truncate(response, 200))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: usize,
    temperature: f64,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Anthropic messages-API implementation of the LLM port.
#[derive(Clone)]
pub struct AnthropicLlm {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicLlm {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    async fn chat(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens,
            temperature: 0.3,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: MessageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let text = body
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::Malformed("empty completion".to_string()));
        }

        debug!(model = %self.model, chars = text.len(), "llm completion received");
        Ok(text)
    }
}

#[async_trait]
impl LlmPort for AnthropicLlm {
    async fn decide(&self, prompt: &str) -> Result<DecideOutcome, LlmError> {
        let response = self.chat(prompt, 512).await?;
        parse_decide(&response)
    }

    async fn extract_lesson(&self, prompt: &str) -> Result<LessonExtraction, LlmError> {
        let response = self.chat(prompt, 512).await?;
        parse_lesson(&response)
    }
}
