use std::sync::Arc;

use tracing::debug;

use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::provider::SummaryProvider;
use super::transport::TransportFactory;
use crate::core::config::{ProviderKind, SummarizeConfig};

/// The first provider in [`ProviderKind::PRIORITY`] that is available.
#[must_use]
pub fn select_kind(config: &SummarizeConfig) -> Option<ProviderKind> {
    ProviderKind::PRIORITY
        .into_iter()
        .find(|kind| config.provider(*kind).is_available())
}

/// Picks the provider an invocation will use.
#[derive(Clone)]
pub struct ProviderSelector {
    transports: Arc<dyn TransportFactory>,
}

impl ProviderSelector {
    #[must_use]
    pub fn new(transports: Arc<dyn TransportFactory>) -> Self {
        Self { transports }
    }

    /// Returns `None` when no provider is available; callers treat that as
    /// nothing to do, not as an error.
    #[must_use]
    pub fn select(&self, config: &SummarizeConfig) -> Option<Box<dyn SummaryProvider>> {
        let Some(kind) = select_kind(config) else {
            debug!("No summary provider available");
            return None;
        };

        let provider_config = config.provider(kind).clone();
        debug!("Selected {} provider, model {}", kind, provider_config.model);

        let provider: Box<dyn SummaryProvider> = match kind {
            ProviderKind::OpenAi => {
                let transport = self.transports.chat_transport(&provider_config);
                Box::new(OpenAiProvider::new(provider_config, transport))
            }
            ProviderKind::Gemini => {
                let transport = self.transports.generate_transport(&provider_config);
                Box::new(GeminiProvider::new(provider_config, transport))
            }
        };
        Some(provider)
    }
}
