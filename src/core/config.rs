use std::collections::HashMap;
use std::env;
use std::fmt;

use crate::document::TruncateMode;
use crate::prompt::normalize_prompt;

pub const OPENAI_DEFAULT_URI: &str = "https://api.openai.com/v1/";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const OPENAI_DEFAULT_TEMPERATURE: f32 = 0.5;
pub const OPENAI_DEFAULT_SUMMARY_PROMPT: &str =
    "Summarize the following text in a few sentences, in the language of the text:";

pub const GEMINI_DEFAULT_URI: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_DEFAULT_TEMPERATURE: f32 = 0.7;
pub const GEMINI_DEFAULT_SUMMARY_PROMPT: &str =
    "Summarize the following text in a few sentences, in the language of the text:";

/// Caption shown when no provider is configured.
pub const DEFAULT_CAPTION: &str = "Summarize";

/// Read-only key/value view of process-wide preferences.
///
/// Implementations only need [`Preferences::get_string`]; typed reads parse
/// the raw value and fall back to the supplied default on absence or on a
/// value that does not parse.
pub trait Preferences: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get_string(key)
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_string(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
                true
            }
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
                false
            }
            _ => default,
        }
    }
}

/// Preferences backed by environment variables.
///
/// The key `openai_model` is looked up as `OPENAI_MODEL`, or as
/// `<PREFIX>_OPENAI_MODEL` when a prefix is set. Every read hits the
/// environment, so changes are picked up by the next invocation.
#[derive(Debug, Clone, Default)]
pub struct EnvPreferences {
    prefix: Option<String>,
}

impl EnvPreferences {
    #[must_use]
    pub fn new() -> Self {
        Self { prefix: None }
    }

    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: (!prefix.trim().is_empty()).then(|| prefix.trim().to_ascii_uppercase()),
        }
    }

    fn var_name(&self, key: &str) -> String {
        let key = key.to_ascii_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{prefix}_{key}"),
            None => key,
        }
    }
}

impl Preferences for EnvPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        env::var(self.var_name(key)).ok()
    }
}

/// In-memory preferences, mostly useful for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapPreferences {
    values: HashMap<String, String>,
}

impl MapPreferences {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl Preferences for MapPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Selection order: the first available provider wins.
    pub const PRIORITY: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    const fn defaults(self) -> (&'static str, &'static str, f32, &'static str) {
        match self {
            ProviderKind::OpenAi => (
                OPENAI_DEFAULT_URI,
                OPENAI_DEFAULT_MODEL,
                OPENAI_DEFAULT_TEMPERATURE,
                OPENAI_DEFAULT_SUMMARY_PROMPT,
            ),
            ProviderKind::Gemini => (
                GEMINI_DEFAULT_URI,
                GEMINI_DEFAULT_MODEL,
                GEMINI_DEFAULT_TEMPERATURE,
                GEMINI_DEFAULT_SUMMARY_PROMPT,
            ),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "OpenAI"),
            ProviderKind::Gemini => write!(f, "Gemini"),
        }
    }
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub organization: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub prompt: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("prompt", &self.prompt)
            .finish()
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn load(kind: ProviderKind, prefs: &dyn Preferences) -> Self {
        let prefix = kind.key_prefix();
        let (uri, model, temperature, prompt) = kind.defaults();

        let api_key = prefs
            .get_string(&format!("{prefix}_apikey"))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let mut base_url = prefs.get_str(&format!("{prefix}_uri"), uri).trim().to_string();
        if base_url.is_empty() {
            base_url = uri.to_string();
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let organization = match kind {
            ProviderKind::OpenAi => prefs
                .get_string("openai_organization")
                .filter(|o| !o.trim().is_empty()),
            ProviderKind::Gemini => None,
        };

        let model = prefs.get_str(&format!("{prefix}_model"), model);
        let prompt = prefs.get_str(&format!("{prefix}_summarize"), prompt);

        Self {
            kind,
            enabled: prefs.get_bool(&format!("{prefix}_enabled"), true),
            api_key,
            base_url,
            organization,
            model: if model.trim().is_empty() {
                kind.defaults().1.to_string()
            } else {
                model.trim().to_string()
            },
            temperature: prefs
                .get_float(&format!("{prefix}_temperature"), temperature)
                .clamp(0.0, 2.0),
            prompt,
        }
    }

    /// The configured prompt cleaned up, or the provider's default when it
    /// is blank.
    #[must_use]
    pub fn effective_prompt(&self) -> String {
        normalize_prompt(&self.prompt, self.kind.defaults().3)
    }

    /// A provider is usable when enabled and an API key is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

/// Snapshot of everything one summarize invocation reads from preferences.
///
/// Loaded once when an invocation starts and passed down explicitly; nothing
/// below the orchestrator reads preferences directly.
#[derive(Debug, Clone)]
pub struct SummarizeConfig {
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
    pub remove_signatures: bool,
    pub truncate_mode: TruncateMode,
    pub sample_count: u32,
}

impl SummarizeConfig {
    #[must_use]
    pub fn load(prefs: &dyn Preferences) -> Self {
        let truncate_mode = prefs
            .get_string("summarize_truncate")
            .and_then(|v| v.parse::<TruncateMode>().ok())
            .unwrap_or_default();

        Self {
            openai: ProviderConfig::load(ProviderKind::OpenAi, prefs),
            gemini: ProviderConfig::load(ProviderKind::Gemini, prefs),
            remove_signatures: prefs.get_bool("remove_signatures", false),
            truncate_mode,
            sample_count: prefs.get_int("summarize_samples", 1).clamp(1, 8) as u32,
        }
    }

    #[must_use]
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Caption for the summary header: the prompt of the provider that will
    /// be used, or a generic title when none is available.
    #[must_use]
    pub fn caption(&self) -> String {
        ProviderKind::PRIORITY
            .iter()
            .map(|kind| self.provider(*kind))
            .find(|config| config.is_available())
            .map_or_else(|| DEFAULT_CAPTION.to_string(), ProviderConfig::effective_prompt)
    }
}
