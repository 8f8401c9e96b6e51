//! `OpenAI` chat completions provider.
//!
//! Consumes the rich body representation: the conversation is one user
//! message carrying the prompt, one carrying the subject (when present) and
//! one multi-part message carrying the body text and images.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{
    ChatCompletionMessage, Content, ContentType, ImageUrl, ImageUrlType, MessageRole,
};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::provider::{RequestInput, SummaryProvider};
use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::models::{ContentPart, SummaryBody, SummaryRequest, SummaryResult};
use crate::errors::SummarizeError;
use crate::prompt::single_line;

pub const CONTENT_TEXT: &str = "text";
pub const CONTENT_IMAGE: &str = "image_url";

/// Longest provider error body echoed into an error message.
const MAX_ERROR_BODY_LEN: usize = 500;

/// One typed content part of a returned completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPart {
    pub kind: String,
    pub text: String,
}

impl CompletionPart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: CONTENT_TEXT.to_string(),
            text: text.into(),
        }
    }
}

/// One returned completion (a `choices[]` entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub role: String,
    pub content: Vec<CompletionPart>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status or an
    /// unparseable response.
    async fn complete_chat(
        &self,
        model: &str,
        messages: &[ChatCompletionMessage],
        temperature: f32,
        sample_count: u32,
    ) -> Result<Vec<Completion>, SummarizeError>;
}

/// Chat completions over HTTP.
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
}

impl OpenAiHttpTransport {
    #[must_use]
    pub fn new(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            organization: config.organization.clone(),
        }
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap, SummarizeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth_value = format!("Bearer {}", self.api_key)
            .parse()
            .map_err(|e| SummarizeError::HttpError(format!("Invalid Authorization header: {e}")))?;
        headers.insert("Authorization", auth_value);

        let content_type_value = "application/json"
            .parse()
            .map_err(|e| SummarizeError::HttpError(format!("Invalid Content-Type header: {e}")))?;
        headers.insert("Content-Type", content_type_value);

        if let Some(org) = &self.organization {
            let org_value = org.parse().map_err(|e| {
                SummarizeError::HttpError(format!("Invalid OpenAI-Organization header: {e}"))
            })?;
            headers.insert("OpenAI-Organization", org_value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl ChatTransport for OpenAiHttpTransport {
    async fn complete_chat(
        &self,
        model: &str,
        messages: &[ChatCompletionMessage],
        temperature: f32,
        sample_count: u32,
    ) -> Result<Vec<Completion>, SummarizeError> {
        let request_body = json!({
            "model": model,
            "messages": build_chat_messages(messages),
            "temperature": temperature,
            "n": sample_count.max(1),
        });

        #[cfg(feature = "debug-logs")]
        info!("OpenAI request body:\n{}", request_body);

        let response = self
            .client
            .post(format!("{}chat/completions", self.base_url))
            .headers(self.headers()?)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SummarizeError::HttpError(format!("OpenAI API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|e| {
                format!("Failed to read error response body (status {status}): {e}")
            });
            return Err(SummarizeError::OpenAIError(format!(
                "status {status}: {}",
                describe_error_body(&error_text)
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            SummarizeError::OpenAIError(format!("Failed to parse OpenAI response: {e}"))
        })?;

        parse_completions(&response_json)
    }
}

/// Serializes chat messages into the chat completions wire format.
///
/// Plain text content stays a string; multi-part content becomes typed
/// `text` / `image_url` parts.
pub(crate) fn build_chat_messages(messages: &[ChatCompletionMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role_str = match m.role {
                MessageRole::system => "system",
                MessageRole::user | MessageRole::function | MessageRole::tool => "user",
                MessageRole::assistant => "assistant",
            };

            let content = match &m.content {
                Content::Text(t) => json!(t),
                Content::ImageUrl(parts) => {
                    let parts: Vec<Value> = parts
                        .iter()
                        .filter_map(|part| {
                            if let Some(ref iu) = part.image_url {
                                Some(json!({
                                    "type": CONTENT_IMAGE,
                                    "image_url": { "url": iu.url }
                                }))
                            } else {
                                part.text.as_ref().map(|t| {
                                    json!({
                                        "type": CONTENT_TEXT,
                                        "text": t
                                    })
                                })
                            }
                        })
                        .collect();
                    json!(parts)
                }
            };

            json!({
                "role": role_str,
                "content": content
            })
        })
        .collect()
}

/// Extracts completions from a chat completions response.
///
/// # Errors
///
/// Returns an error when the response has no `choices` array.
pub(crate) fn parse_completions(response: &Value) -> Result<Vec<Completion>, SummarizeError> {
    let choices = response
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SummarizeError::OpenAIError("Malformed OpenAI response: missing choices".to_string())
        })?;

    let completions = choices
        .iter()
        .filter_map(|choice| choice.get("message"))
        .map(|message| {
            let role = message
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("assistant")
                .to_string();

            let mut content: Vec<CompletionPart> = match message.get("content") {
                Some(Value::String(s)) => vec![CompletionPart::text(s.as_str())],
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|p| {
                        let kind = p
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let text = p
                            .get("text")
                            .and_then(Value::as_str)
                            .or_else(|| {
                                p.get("text")
                                    .and_then(|t| t.get("value"))
                                    .and_then(Value::as_str)
                            })
                            .unwrap_or_default()
                            .to_string();
                        CompletionPart { kind, text }
                    })
                    .collect(),
                _ => Vec::new(),
            };

            if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
                content.push(CompletionPart {
                    kind: "refusal".to_string(),
                    text: refusal.to_string(),
                });
            }

            Completion { role, content }
        })
        .collect();

    Ok(completions)
}

/// Prefers the `error.message` field of a JSON error body.
pub(crate) fn describe_error_body(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    message.chars().take(MAX_ERROR_BODY_LEN).collect()
}

fn user_message(content: Content) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role: MessageRole::user,
        content,
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

fn to_multipart(parts: &[ContentPart]) -> Vec<ImageUrl> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => ImageUrl {
                r#type: ContentType::text,
                text: Some(text.clone()),
                image_url: None,
            },
            ContentPart::Image { url } => ImageUrl {
                r#type: ContentType::image_url,
                text: None,
                image_url: Some(ImageUrlType { url: url.clone() }),
            },
        })
        .collect()
}

pub struct OpenAiProvider {
    config: ProviderConfig,
    transport: Arc<dyn ChatTransport>,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(config: ProviderConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self { config, transport }
    }

    /// The conversation sent for `request`: prompt, optional subject, body.
    #[must_use]
    pub fn chat_messages(request: &SummaryRequest) -> Vec<ChatCompletionMessage> {
        let mut chat = vec![user_message(Content::Text(request.prompt().to_string()))];

        if let Some(subject) = request.subject() {
            chat.push(user_message(Content::Text(subject.to_string())));
        }

        let body = match request.body() {
            SummaryBody::Rich(parts) => Content::ImageUrl(to_multipart(parts)),
            SummaryBody::Plain(text) => Content::Text(text.clone()),
        };
        chat.push(user_message(body));

        chat
    }
}

#[async_trait]
impl SummaryProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn accepts_images(&self) -> bool {
        true
    }

    fn build_request(&self, input: &RequestInput<'_>) -> Option<SummaryRequest> {
        let parts = input
            .document
            .content_parts(input.inline_images, input.truncate_mode);
        if parts.is_empty() {
            debug!("Message {} has no content to send to OpenAI", input.message_id);
            return None;
        }

        Some(SummaryRequest::new(
            input.message_id,
            ProviderKind::OpenAi,
            self.config.model.clone(),
            self.config.effective_prompt(),
            input.subject.map(single_line),
            SummaryBody::Rich(parts),
            self.config.temperature,
            input.sample_count,
        ))
    }

    async fn execute(&self, request: &SummaryRequest) -> Result<SummaryResult, SummarizeError> {
        let messages = Self::chat_messages(request);

        info!(
            "Requesting OpenAI summary for message {} with model {} ({} messages, {} body bytes)",
            request.message_id(),
            request.model(),
            messages.len(),
            request.body().text_len()
        );

        let start = Instant::now();
        let completions = self
            .transport
            .complete_chat(
                request.model(),
                &messages,
                request.temperature(),
                request.sample_count(),
            )
            .await?;
        let elapsed = start.elapsed();

        let fragments: Vec<String> = completions
            .iter()
            .flat_map(|completion| completion.content.iter())
            .filter(|part| part.kind == CONTENT_TEXT)
            .map(|part| part.text.clone())
            .collect();

        info!(
            "OpenAI returned {} completions, {} text fragments in {} ms",
            completions.len(),
            fragments.len(),
            elapsed.as_millis()
        );

        Ok(SummaryResult::new(fragments, elapsed))
    }
}
