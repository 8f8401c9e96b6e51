//! All AI/LLM functionality

pub mod gemini;
pub mod openai;
pub mod provider;
pub mod selector;
pub mod transport;

// Re-export main types for convenience
pub use provider::{RequestInput, SummaryProvider};
pub use selector::{ProviderSelector, select_kind};
pub use transport::{HttpTransports, TransportFactory};
