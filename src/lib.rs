/// TLDR Mail - summarizes stored email bodies with an LLM provider.
///
/// A summarize invocation loads a message body, reduces it to a bounded,
/// viewer-safe document, picks the first available provider (`OpenAI`, then
/// Gemini) and reports the summary or a safe error back to the caller.
///
/// # Architecture
///
/// - `worker::task` runs work on the tokio runtime and delivers lifecycle
///   callbacks on the owning context
/// - `document` prepares bodies: signatures, quotes, sanitization, truncation
/// - `ai` holds the provider abstraction, both providers and selection
/// - `worker::summarize` composes the pipeline
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tldr_mail::ai::{HttpTransports, ProviderSelector};
/// use tldr_mail::core::config::EnvPreferences;
/// use tldr_mail::core::models::MessageId;
/// use tldr_mail::storage::DirectoryStore;
/// use tldr_mail::worker::SummarizeOrchestrator;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     tldr_mail::setup_logging();
///
///     let orchestrator = SummarizeOrchestrator::new(
///         Arc::new(DirectoryStore::new("/var/mail/store")),
///         Arc::new(EnvPreferences::new()),
///         ProviderSelector::new(Arc::new(HttpTransports::new()?)),
///     );
///
///     match orchestrator.summarize(MessageId(42)).await? {
///         Some(summary) => println!("{}", summary.result.text()),
///         None => println!("Nothing to summarize"),
///     }
///     Ok(())
/// }
/// ```
// Module declarations
pub mod ai;
pub mod core;
pub mod document;
pub mod errors;
pub mod prompt;
pub mod storage;
pub mod worker;

pub use errors::SummarizeError;

/// Configure structured JSON logging.
///
/// The level comes from `RUST_LOG` and defaults to `info`. Calling this more
/// than once is harmless.
///
/// # Example
///
/// ```
/// tldr_mail::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
