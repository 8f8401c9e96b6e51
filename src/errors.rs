use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest error description handed to a view.
pub const MAX_SAFE_MESSAGE_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Failed to load message: {0}")]
    StorageError(String),

    #[error("Failed to read document: {0}")]
    DocumentError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to access OpenAI API: {0}")]
    OpenAIError(String),

    #[error("Failed to access Gemini API: {0}")]
    GeminiError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Background task failed: {0}")]
    TaskError(String),
}

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b(key|api_key|apikey|token|access_token)=[^&\s]+", "$1=***"),
        (r"(?i)bearer\s+[A-Za-z0-9._\-]+", "Bearer ***"),
        (r"\bsk-[A-Za-z0-9_\-]{8,}", "sk-***"),
        (r"\bAIza[A-Za-z0-9_\-]{20,}", "AIza***"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

impl SummarizeError {
    /// Short description suitable for showing to a user.
    ///
    /// Credentials that transports tend to echo back (query keys, bearer
    /// tokens, raw API keys) are masked and the text is capped at
    /// [`MAX_SAFE_MESSAGE_LEN`] characters.
    #[must_use]
    pub fn safe_message(&self) -> String {
        let mut message = self.to_string();
        for (re, replacement) in SECRET_PATTERNS.iter() {
            message = re.replace_all(&message, *replacement).into_owned();
        }

        let message = message.trim();
        if message.chars().count() <= MAX_SAFE_MESSAGE_LEN {
            return message.to_string();
        }

        let mut short: String = message.chars().take(MAX_SAFE_MESSAGE_LEN - 1).collect();
        short.push('…');
        short
    }
}

impl From<reqwest::Error> for SummarizeError {
    fn from(error: reqwest::Error) -> Self {
        SummarizeError::HttpError(error.to_string())
    }
}

impl From<std::io::Error> for SummarizeError {
    fn from(error: std::io::Error) -> Self {
        SummarizeError::StorageError(error.to_string())
    }
}

impl From<serde_json::Error> for SummarizeError {
    fn from(error: serde_json::Error) -> Self {
        SummarizeError::StorageError(format!("Invalid JSON: {error}"))
    }
}

impl From<anyhow::Error> for SummarizeError {
    fn from(error: anyhow::Error) -> Self {
        SummarizeError::TaskError(error.to_string())
    }
}
