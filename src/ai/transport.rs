//! Construction of provider transports from a configuration snapshot.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::gemini::{GeminiHttpTransport, GenerateTransport};
use super::openai::{ChatTransport, OpenAiHttpTransport};
use crate::core::config::ProviderConfig;
use crate::errors::SummarizeError;

/// Request timeout of the HTTP transports.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Builds transports for the selected provider. Transports capture
/// credentials and endpoints, so they are built per invocation from the
/// snapshot that invocation loaded.
pub trait TransportFactory: Send + Sync {
    fn chat_transport(&self, config: &ProviderConfig) -> Arc<dyn ChatTransport>;

    fn generate_transport(&self, config: &ProviderConfig) -> Arc<dyn GenerateTransport>;
}

/// reqwest-backed transports sharing one connection pool.
#[derive(Clone)]
pub struct HttpTransports {
    client: Client,
}

impl HttpTransports {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, SummarizeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SummarizeError::HttpError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl TransportFactory for HttpTransports {
    fn chat_transport(&self, config: &ProviderConfig) -> Arc<dyn ChatTransport> {
        Arc::new(OpenAiHttpTransport::new(self.client.clone(), config))
    }

    fn generate_transport(&self, config: &ProviderConfig) -> Arc<dyn GenerateTransport> {
        Arc::new(GeminiHttpTransport::new(self.client.clone(), config))
    }
}
