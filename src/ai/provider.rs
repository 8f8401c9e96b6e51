//! The provider abstraction shared by all LLM variants.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::models::{MessageId, SummaryRequest, SummaryResult};
use crate::document::{RichDocument, TruncateMode};
use crate::errors::SummarizeError;

/// Everything a provider may draw on when building its request.
pub struct RequestInput<'a> {
    pub message_id: MessageId,
    pub subject: Option<&'a str>,
    /// The already prepared body.
    pub document: &'a RichDocument,
    /// Data URIs for `cid:` images, keyed by content id. Only filled for
    /// providers that accept images.
    pub inline_images: &'a HashMap<String, String>,
    pub sample_count: u32,
    /// How the rendered text part is cut when it runs over the size bound.
    pub truncate_mode: TruncateMode,
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn config(&self) -> &ProviderConfig;

    /// Whether the rich body representation may carry images.
    fn accepts_images(&self) -> bool {
        false
    }

    /// Builds the request in this provider's body representation.
    ///
    /// Returns `None` when the document holds nothing worth sending.
    fn build_request(&self, input: &RequestInput<'_>) -> Option<SummaryRequest>;

    /// Sends the request and collects the returned text fragments.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails or the response cannot be
    /// interpreted. An answer without text is a success with no fragments.
    async fn execute(&self, request: &SummaryRequest) -> Result<SummaryResult, SummarizeError>;
}
