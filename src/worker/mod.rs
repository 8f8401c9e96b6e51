//! Background execution and the summarize pipeline built on it

pub mod summarize;
pub mod task;

pub use summarize::{SummarizeOrchestrator, SummarizeStage, SummaryView};
pub use task::{AsyncTask, OutcomeKind, TaskHandle, TaskOutcome, TaskOwner};
