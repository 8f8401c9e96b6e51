use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub id: MessageId,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Vec<String>,
    /// Whether the message body has been downloaded.
    #[serde(default)]
    pub content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { url: String },
}

/// Body of a request, in the representation the target provider consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryBody {
    Rich(Vec<ContentPart>),
    Plain(String),
}

impl SummaryBody {
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            SummaryBody::Rich(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text(t) => t.len(),
                    ContentPart::Image { .. } => 0,
                })
                .sum(),
            SummaryBody::Plain(text) => text.len(),
        }
    }
}

/// A single provider request. Built fresh for each invocation and never
/// modified afterwards.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    message_id: MessageId,
    provider: ProviderKind,
    model: String,
    prompt: String,
    subject: Option<String>,
    body: SummaryBody,
    temperature: f32,
    sample_count: u32,
}

impl SummaryRequest {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        message_id: MessageId,
        provider: ProviderKind,
        model: impl Into<String>,
        prompt: impl Into<String>,
        subject: Option<String>,
        body: SummaryBody,
        temperature: f32,
        sample_count: u32,
    ) -> Self {
        Self {
            message_id,
            provider,
            model: model.into(),
            prompt: prompt.into(),
            subject: subject.filter(|s| !s.trim().is_empty()),
            body,
            temperature,
            sample_count: sample_count.max(1),
        }
    }

    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    #[must_use]
    pub fn body(&self) -> &SummaryBody {
        &self.body
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryResult {
    pub fragments: Vec<String>,
    pub elapsed: Duration,
}

impl SummaryResult {
    #[must_use]
    pub fn new(fragments: Vec<String>, elapsed: Duration) -> Self {
        Self { fragments, elapsed }
    }

    #[must_use]
    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Fragments joined in order with newline separators.
    #[must_use]
    pub fn text(&self) -> String {
        self.fragments.join("\n")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// What a successful invocation hands to the view.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub provider: ProviderKind,
    pub result: SummaryResult,
}
