//! Gemini `generateContent` provider.
//!
//! Consumes the plain-text body representation: a single user message whose
//! parts are the prompt and the body text. The subject is not sent.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::openai::describe_error_body;
use super::provider::{RequestInput, SummaryProvider};
use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::models::{ContentPart, SummaryBody, SummaryRequest, SummaryResult};
use crate::errors::SummarizeError;

pub const USER: &str = "user";
pub const MODEL: &str = "model";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiMessage {
    pub role: String,
    pub parts: Vec<String>,
}

impl GeminiMessage {
    #[must_use]
    pub fn new(role: &str, parts: Vec<String>) -> Self {
        Self {
            role: role.to_string(),
            parts,
        }
    }
}

#[async_trait]
pub trait GenerateTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, a
    /// blocked prompt or an unparseable response.
    async fn generate(
        &self,
        model: &str,
        messages: &[GeminiMessage],
        temperature: f32,
        sample_count: u32,
    ) -> Result<Vec<GeminiMessage>, SummarizeError>;
}

pub struct GeminiHttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiHttpTransport {
    #[must_use]
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl GenerateTransport for GeminiHttpTransport {
    async fn generate(
        &self,
        model: &str,
        messages: &[GeminiMessage],
        temperature: f32,
        sample_count: u32,
    ) -> Result<Vec<GeminiMessage>, SummarizeError> {
        let model = model.trim().trim_start_matches("models/");
        let request_body = build_generate_body(messages, temperature, sample_count);

        #[cfg(feature = "debug-logs")]
        info!("Gemini request body:\n{}", request_body);

        let response = self
            .client
            .post(format!("{}models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SummarizeError::HttpError(format!("Gemini API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|e| {
                format!("Failed to read error response body (status {status}): {e}")
            });
            return Err(SummarizeError::GeminiError(format!(
                "status {status}: {}",
                describe_error_body(&error_text)
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            SummarizeError::GeminiError(format!("Failed to parse Gemini response: {e}"))
        })?;

        parse_candidates(&response_json)
    }
}

pub(crate) fn build_generate_body(
    messages: &[GeminiMessage],
    temperature: f32,
    sample_count: u32,
) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .map(|m| {
            let parts: Vec<Value> = m.parts.iter().map(|p| json!({ "text": p })).collect();
            json!({
                "role": m.role,
                "parts": parts
            })
        })
        .collect();

    json!({
        "contents": contents,
        "generationConfig": {
            "temperature": temperature,
            "candidateCount": sample_count.max(1)
        }
    })
}

/// Extracts candidate messages from a `generateContent` response.
///
/// # Errors
///
/// Returns an error when the prompt was blocked and no candidate came back.
pub(crate) fn parse_candidates(response: &Value) -> Result<Vec<GeminiMessage>, SummarizeError> {
    let Some(candidates) = response.get("candidates").and_then(Value::as_array) else {
        if let Some(reason) = response
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(SummarizeError::GeminiError(format!(
                "Prompt blocked: {reason}"
            )));
        }
        return Ok(Vec::new());
    };

    let messages = candidates
        .iter()
        .filter_map(|candidate| {
            let Some(content) = candidate.get("content") else {
                if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
                    warn!("Gemini candidate without content, finish reason {}", reason);
                }
                return None;
            };
            let role = content
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or(MODEL)
                .to_string();
            let parts = content
                .get("parts")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(GeminiMessage { role, parts })
        })
        .collect();

    Ok(messages)
}

pub struct GeminiProvider {
    config: ProviderConfig,
    transport: Arc<dyn GenerateTransport>,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, transport: Arc<dyn GenerateTransport>) -> Self {
        Self { config, transport }
    }

    /// The single message sent for `request`: `[prompt, body text]`.
    #[must_use]
    pub fn generate_messages(request: &SummaryRequest) -> Vec<GeminiMessage> {
        let text = match request.body() {
            SummaryBody::Plain(text) => text.clone(),
            SummaryBody::Rich(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text(t) => Some(t.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        vec![GeminiMessage::new(
            USER,
            vec![request.prompt().to_string(), text],
        )]
    }
}

#[async_trait]
impl SummaryProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(&self, input: &RequestInput<'_>) -> Option<SummaryRequest> {
        let text = input.document.text();
        if text.trim().is_empty() {
            debug!("Message {} has no text to send to Gemini", input.message_id);
            return None;
        }

        Some(SummaryRequest::new(
            input.message_id,
            ProviderKind::Gemini,
            self.config.model.clone(),
            self.config.effective_prompt(),
            None,
            SummaryBody::Plain(text),
            self.config.temperature,
            input.sample_count,
        ))
    }

    async fn execute(&self, request: &SummaryRequest) -> Result<SummaryResult, SummarizeError> {
        let messages = Self::generate_messages(request);

        info!(
            "Requesting Gemini summary for message {} with model {} ({} body bytes)",
            request.message_id(),
            request.model(),
            request.body().text_len()
        );

        let start = Instant::now();
        let result = self
            .transport
            .generate(
                request.model(),
                &messages,
                request.temperature(),
                request.sample_count(),
            )
            .await?;
        let elapsed = start.elapsed();

        let fragments = result
            .into_iter()
            .next()
            .map(|message| message.parts)
            .unwrap_or_default();

        info!(
            "Gemini returned {} fragments in {} ms",
            fragments.len(),
            elapsed.as_millis()
        );

        Ok(SummaryResult::new(fragments, elapsed))
    }
}
