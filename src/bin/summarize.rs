#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tldr_mail::ai::{HttpTransports, ProviderSelector};
use tldr_mail::core::config::{EnvPreferences, Preferences};
use tldr_mail::core::models::MessageId;
use tldr_mail::storage::{DirectoryStore, MessageStore};
use tldr_mail::worker::{OutcomeKind, SummarizeOrchestrator, SummaryView, TaskOwner};
use tracing::info;

#[derive(Parser)]
#[command(name = "tldr-mail")]
#[command(about = "Summarize a stored email message", long_about = None)]
struct Cli {
    #[arg(help = "Id of the message to summarize")]
    message_id: i64,

    #[arg(short, long, help = "Message store directory")]
    store: PathBuf,

    #[arg(long, help = "Sender shown in the header (defaults to the stored sender)")]
    from: Option<String>,

    #[arg(long, help = "Subject shown in the header (defaults to the stored subject)")]
    subject: Option<String>,

    #[arg(long, help = "Prefix of the environment variables holding preferences")]
    env_prefix: Option<String>,
}

/// Prints the dialog to the terminal.
struct ConsoleView;

fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis} ms")
    } else {
        format!("{:.1} s", elapsed.as_secs_f64())
    }
}

impl SummaryView for ConsoleView {
    fn show_header(&self, caption: &str, from: &str, subject: &str) {
        println!("{caption}");
        if !from.is_empty() {
            println!("From: {from}");
        }
        if !subject.is_empty() {
            println!("Subject: {subject}");
        }
        println!();
    }

    fn clear(&self) {}

    fn set_progress(&self, busy: bool) {
        if busy {
            eprintln!("Summarizing...");
        }
    }

    fn show_summary(&self, text: &str, elapsed: Duration) {
        println!("{text}");
        println!();
        println!("({})", format_elapsed(elapsed));
    }

    fn show_error(&self, message: &str) {
        eprintln!("Error: {message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tldr_mail::setup_logging();
    let cli = Cli::parse();

    let preferences: Arc<dyn Preferences> = Arc::new(match cli.env_prefix {
        Some(prefix) => EnvPreferences::with_prefix(prefix),
        None => EnvPreferences::new(),
    });
    let store = Arc::new(DirectoryStore::new(cli.store));
    let message_id = MessageId(cli.message_id);

    let metadata = store.get_message(message_id).await?;
    let from = cli.from.unwrap_or_else(|| {
        metadata
            .as_ref()
            .map(|m| m.from.join(", "))
            .unwrap_or_default()
    });
    let subject = cli.subject.unwrap_or_else(|| {
        metadata
            .as_ref()
            .and_then(|m| m.subject.clone())
            .unwrap_or_default()
    });

    let orchestrator = Arc::new(SummarizeOrchestrator::new(
        store,
        preferences,
        ProviderSelector::new(Arc::new(HttpTransports::new()?)),
    ));

    let mut owner = TaskOwner::new();
    let handle = orchestrator.invoke(
        &owner,
        Arc::new(ConsoleView),
        message_id,
        &from,
        &subject,
    );
    owner.run_until_idle().await;

    let outcome = handle.wait().await;
    info!("Summarize of message {} finished: {:?}", message_id, outcome);

    Ok(match outcome {
        OutcomeKind::Success => ExitCode::SUCCESS,
        OutcomeKind::Failure | OutcomeKind::Cancelled => ExitCode::FAILURE,
    })
}
