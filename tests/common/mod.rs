#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;
use tldr_mail::ai::gemini::{GeminiMessage, GenerateTransport};
use tldr_mail::ai::openai::{ChatTransport, Completion, CompletionPart};
use tldr_mail::ai::{ProviderSelector, TransportFactory};
use tldr_mail::core::config::{MapPreferences, ProviderConfig};
use tldr_mail::core::models::{MessageId, MessageMetadata};
use tldr_mail::document::RichDocument;
use tldr_mail::document::images::InlineImage;
use tldr_mail::errors::SummarizeError;
use tldr_mail::storage::MessageStore;
use tldr_mail::worker::{SummarizeOrchestrator, SummaryView};

/// Message store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    messages: HashMap<MessageId, MessageMetadata>,
    bodies: HashMap<MessageId, String>,
    images: HashMap<(MessageId, String), InlineImage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, id: i64, subject: Option<&str>, body: Option<&str>) -> Self {
        let id = MessageId(id);
        self.messages.insert(
            id,
            MessageMetadata {
                id,
                subject: subject.map(str::to_string),
                from: vec!["alice@example.com".to_string()],
                content: body.is_some(),
            },
        );
        if let Some(body) = body {
            self.bodies.insert(id, body.to_string());
        }
        self
    }

    pub fn with_image(mut self, id: i64, cid: &str, image: InlineImage) -> Self {
        self.images.insert((MessageId(id), cid.to_string()), image);
        self
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageMetadata>, SummarizeError> {
        Ok(self.messages.get(&id).cloned())
    }

    fn document_path(&self, id: MessageId) -> PathBuf {
        PathBuf::from(format!("{id}.html"))
    }

    async fn document_exists(&self, id: MessageId) -> bool {
        self.bodies.contains_key(&id)
    }

    async fn parse_document(&self, path: &std::path::Path) -> Result<RichDocument, SummarizeError> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok())
            .map(MessageId)
            .ok_or_else(|| SummarizeError::DocumentError(path.display().to_string()))?;
        self.bodies
            .get(&id)
            .map(|html| RichDocument::parse(html))
            .ok_or_else(|| SummarizeError::DocumentError(path.display().to_string()))
    }

    async fn inline_image(
        &self,
        id: MessageId,
        cid: &str,
    ) -> Result<Option<InlineImage>, SummarizeError> {
        Ok(self.images.get(&(id, cid.to_string())).cloned())
    }
}

/// Chat transport returning canned completions and recording requests.
pub struct FakeChat {
    reply: Result<Vec<Completion>, String>,
    pub calls: Mutex<Vec<Vec<ChatCompletionMessage>>>,
}

impl FakeChat {
    pub fn replying(texts: &[&str]) -> Arc<Self> {
        let completions = texts
            .iter()
            .map(|t| Completion {
                role: "assistant".to_string(),
                content: vec![CompletionPart::text(*t)],
            })
            .collect();
        Self::with_completions(completions)
    }

    pub fn with_completions(completions: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(completions),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for FakeChat {
    async fn complete_chat(
        &self,
        _model: &str,
        messages: &[ChatCompletionMessage],
        _temperature: f32,
        _sample_count: u32,
    ) -> Result<Vec<Completion>, SummarizeError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.reply
            .clone()
            .map_err(SummarizeError::OpenAIError)
    }
}

/// Generate transport returning canned messages and recording requests.
pub struct FakeGenerate {
    reply: Result<Vec<GeminiMessage>, String>,
    pub calls: Mutex<Vec<Vec<GeminiMessage>>>,
}

impl FakeGenerate {
    pub fn replying(parts: &[&str]) -> Arc<Self> {
        let message = GeminiMessage::new("model", parts.iter().map(|p| (*p).to_string()).collect());
        Arc::new(Self {
            reply: Ok(vec![message]),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerateTransport for FakeGenerate {
    async fn generate(
        &self,
        _model: &str,
        messages: &[GeminiMessage],
        _temperature: f32,
        _sample_count: u32,
    ) -> Result<Vec<GeminiMessage>, SummarizeError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.reply.clone().map_err(SummarizeError::GeminiError)
    }
}

/// Hands out the same fake transports for every invocation.
pub struct FakeTransports {
    pub chat: Arc<FakeChat>,
    pub generate: Arc<FakeGenerate>,
    pub built: AtomicUsize,
}

impl FakeTransports {
    pub fn new(chat: Arc<FakeChat>, generate: Arc<FakeGenerate>) -> Arc<Self> {
        Arc::new(Self {
            chat,
            generate,
            built: AtomicUsize::new(0),
        })
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl TransportFactory for FakeTransports {
    fn chat_transport(&self, _config: &ProviderConfig) -> Arc<dyn ChatTransport> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.chat.clone()
    }

    fn generate_transport(&self, _config: &ProviderConfig) -> Arc<dyn GenerateTransport> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.generate.clone()
    }
}

pub fn openai_prefs() -> MapPreferences {
    MapPreferences::new()
        .with("openai_apikey", "sk-test-key")
        .with("openai_summarize", "Summarize")
}

pub fn gemini_prefs() -> MapPreferences {
    MapPreferences::new()
        .with("gemini_apikey", "AIza-test-key")
        .with("gemini_summarize", "Summarize")
}

pub fn orchestrator(
    store: MemoryStore,
    prefs: MapPreferences,
    transports: Arc<FakeTransports>,
) -> Arc<SummarizeOrchestrator> {
    Arc::new(SummarizeOrchestrator::new(
        Arc::new(store),
        Arc::new(prefs),
        ProviderSelector::new(transports),
    ))
}

/// View recording every call as a line of text.
#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<String>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SummaryView for RecordingView {
    fn show_header(&self, caption: &str, from: &str, subject: &str) {
        self.record(format!("header:{caption}|{from}|{subject}"));
    }

    fn clear(&self) {
        self.record("clear".to_string());
    }

    fn set_progress(&self, busy: bool) {
        self.record(format!("progress:{busy}"));
    }

    fn show_summary(&self, text: &str, _elapsed: Duration) {
        self.record(format!("summary:{text}"));
    }

    fn show_error(&self, message: &str) {
        self.record(format!("error:{message}"));
    }
}
