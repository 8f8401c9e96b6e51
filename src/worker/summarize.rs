use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::task::{AsyncTask, TaskHandle, TaskOwner};
use crate::ai::{ProviderSelector, RequestInput};
use crate::core::config::{Preferences, SummarizeConfig};
use crate::core::models::{MessageId, MessageMetadata, Summary};
use crate::document::{MAX_SUMMARIZE_TEXT_SIZE, PrepareOptions, RichDocument, prepare_document};
use crate::errors::SummarizeError;
use crate::storage::MessageStore;

/// Where an invocation is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizeStage {
    Idle,
    Loading,
    Preparing,
    Selecting,
    Dispatching,
    Succeeded,
    Failed,
    Empty,
}

impl SummarizeStage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SummarizeStage::Succeeded | SummarizeStage::Failed | SummarizeStage::Empty
        )
    }
}

impl fmt::Display for SummarizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SummarizeStage::Idle => "idle",
            SummarizeStage::Loading => "loading",
            SummarizeStage::Preparing => "preparing",
            SummarizeStage::Selecting => "selecting",
            SummarizeStage::Dispatching => "dispatching",
            SummarizeStage::Succeeded => "succeeded",
            SummarizeStage::Failed => "failed",
            SummarizeStage::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of one invocation. Starts in `Idle`; once a terminal
/// stage is reached further transitions are ignored.
struct StageLog {
    message_id: MessageId,
    stage: SummarizeStage,
}

impl StageLog {
    fn new(message_id: MessageId) -> Self {
        debug!("Summarize {}: {}", message_id, SummarizeStage::Idle);
        Self {
            message_id,
            stage: SummarizeStage::Idle,
        }
    }

    fn enter(&mut self, stage: SummarizeStage) {
        if self.stage.is_terminal() {
            warn!(
                "Summarize {}: ignoring {} after {}",
                self.message_id, stage, self.stage
            );
            return;
        }
        debug!("Summarize {}: {}", self.message_id, stage);
        self.stage = stage;
    }
}

/// Surface a summarize invocation reports to.
///
/// All methods are called on the context that drives the [`TaskOwner`].
pub trait SummaryView: Send + Sync {
    fn show_header(&self, caption: &str, from: &str, subject: &str);

    fn clear(&self);

    fn set_progress(&self, busy: bool);

    fn show_summary(&self, text: &str, elapsed: Duration);

    fn show_error(&self, message: &str);
}

pub struct SummarizeOrchestrator {
    store: Arc<dyn MessageStore>,
    preferences: Arc<dyn Preferences>,
    selector: ProviderSelector,
}

impl SummarizeOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        preferences: Arc<dyn Preferences>,
        selector: ProviderSelector,
    ) -> Self {
        Self {
            store,
            preferences,
            selector,
        }
    }

    /// Reads the configuration snapshot for one invocation.
    #[must_use]
    pub fn load_config(&self) -> SummarizeConfig {
        SummarizeConfig::load(self.preferences.as_ref())
    }

    /// Runs the whole pipeline for `message_id` with a fresh configuration
    /// snapshot.
    ///
    /// `Ok(None)` means there was nothing to summarize: no message, no
    /// downloaded body, no available provider or nothing left after
    /// preparation.
    pub async fn summarize(&self, message_id: MessageId) -> Result<Option<Summary>, SummarizeError> {
        let config = self.load_config();
        self.summarize_with(message_id, &config).await
    }

    /// Same as [`summarize`](Self::summarize) with an explicit snapshot.
    pub async fn summarize_with(
        &self,
        message_id: MessageId,
        config: &SummarizeConfig,
    ) -> Result<Option<Summary>, SummarizeError> {
        let span = info_span!(
            "summarize",
            invocation = %Uuid::new_v4(),
            message_id = %message_id
        );

        async {
            let mut stages = StageLog::new(message_id);
            let result = self.run(message_id, config, &mut stages).await;
            stages.enter(match &result {
                Ok(Some(_)) => SummarizeStage::Succeeded,
                Ok(None) => SummarizeStage::Empty,
                Err(_) => SummarizeStage::Failed,
            });
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        message_id: MessageId,
        config: &SummarizeConfig,
        stages: &mut StageLog,
    ) -> Result<Option<Summary>, SummarizeError> {
        stages.enter(SummarizeStage::Loading);
        let Some((metadata, mut document)) = self.load_document(message_id).await? else {
            return Ok(None);
        };

        stages.enter(SummarizeStage::Preparing);
        let options = PrepareOptions {
            remove_signatures: config.remove_signatures,
            max_size: MAX_SUMMARIZE_TEXT_SIZE,
            truncate_mode: config.truncate_mode,
        };
        prepare_document(&mut document, &options);

        stages.enter(SummarizeStage::Selecting);
        let Some(provider) = self.selector.select(config) else {
            return Ok(None);
        };

        stages.enter(SummarizeStage::Dispatching);
        let inline_images = if provider.accepts_images() {
            self.resolve_inline_images(message_id, &document).await
        } else {
            HashMap::new()
        };

        let input = RequestInput {
            message_id,
            subject: metadata.subject.as_deref(),
            document: &document,
            inline_images: &inline_images,
            sample_count: config.sample_count,
            truncate_mode: config.truncate_mode,
        };
        let Some(request) = provider.build_request(&input) else {
            return Ok(None);
        };

        let result = provider.execute(&request).await?;
        info!(
            "Summarized message {} with {} in {} ms",
            message_id,
            provider.kind(),
            result.elapsed_millis()
        );

        Ok(Some(Summary {
            provider: provider.kind(),
            result,
        }))
    }

    async fn load_document(
        &self,
        message_id: MessageId,
    ) -> Result<Option<(MessageMetadata, RichDocument)>, SummarizeError> {
        let Some(metadata) = self.store.get_message(message_id).await? else {
            debug!("Message {} not found", message_id);
            return Ok(None);
        };
        if !metadata.content {
            debug!("Message {} has no downloaded content", message_id);
            return Ok(None);
        }
        if !self.store.document_exists(message_id).await {
            debug!("Message {} has no body file", message_id);
            return Ok(None);
        }

        let path = self.store.document_path(message_id);
        let document = self.store.parse_document(&path).await?;
        Ok(Some((metadata, document)))
    }

    async fn resolve_inline_images(
        &self,
        message_id: MessageId,
        document: &RichDocument,
    ) -> HashMap<String, String> {
        let mut images = HashMap::new();
        for cid in document.inline_image_cids() {
            match self.store.inline_image(message_id, &cid).await {
                Ok(Some(image)) if image.is_embeddable() => {
                    images.insert(cid, image.to_data_uri());
                }
                Ok(Some(image)) => {
                    debug!(
                        "Skipping inline image {} ({}, {} bytes)",
                        cid,
                        image.mime,
                        image.bytes.len()
                    );
                }
                Ok(None) => debug!("Inline image {} not stored", cid),
                Err(e) => warn!("Failed to load inline image {}: {}", cid, e),
            }
        }
        images
    }

    /// Starts a summarize invocation for the dialog behind `view`.
    ///
    /// The header is shown right away; everything else is reported through
    /// `view` when `owner` dispatches the outcome.
    pub fn invoke(
        self: &Arc<Self>,
        owner: &TaskOwner,
        view: Arc<dyn SummaryView>,
        message_id: MessageId,
        from: &str,
        subject: &str,
    ) -> TaskHandle {
        let config = self.load_config();
        view.show_header(&config.caption(), from, subject);

        let task = Arc::new(SummarizeTask {
            orchestrator: Arc::clone(self),
            view,
        });
        task.execute(
            owner,
            SummarizeArgs { message_id, config },
            &format!("summarize:{message_id}"),
        )
    }
}

pub struct SummarizeArgs {
    pub message_id: MessageId,
    pub config: SummarizeConfig,
}

struct SummarizeTask {
    orchestrator: Arc<SummarizeOrchestrator>,
    view: Arc<dyn SummaryView>,
}

#[async_trait]
impl AsyncTask for SummarizeTask {
    type Args = SummarizeArgs;
    type Output = Option<Summary>;

    fn on_pre_execute(&self, _args: &SummarizeArgs) {
        self.view.clear();
        self.view.set_progress(true);
    }

    async fn on_execute(&self, args: &SummarizeArgs) -> Result<Option<Summary>, SummarizeError> {
        self.orchestrator
            .summarize_with(args.message_id, &args.config)
            .await
    }

    fn on_executed(&self, args: &SummarizeArgs, output: Option<Summary>) {
        match output {
            Some(summary) => {
                self.view
                    .show_summary(&summary.result.text(), summary.result.elapsed);
            }
            None => debug!("Nothing to show for message {}", args.message_id),
        }
    }

    fn on_exception(&self, args: &SummarizeArgs, error: &SummarizeError) {
        error!("Summarize failed for message {}: {}", args.message_id, error);
        self.view.show_error(&error.safe_message());
    }

    fn on_post_execute(&self, _args: &SummarizeArgs) {
        self.view.set_progress(false);
    }
}
